//! Arithmetic behind the calculator operations.
//!
//! Everything here is synchronous and transport-free. The iterative pieces
//! expose one step at a time so the streaming handlers can interleave them with
//! cancellation checks and outbound sends.

use calculator_tonic_core::Error;

pub fn checked_sum(a: i64, b: i64) -> Result<i64, Error> {
    a.checked_add(b)
        .ok_or_else(|| Error::invalid_argument(format!("sum of {a} and {b} overflows")))
}

/// Square root of a non-negative integer. Negative input is rejected before
/// any computation happens.
pub fn square_root(value: i64) -> Result<f64, Error> {
    if value < 0 {
        return Err(Error::NegativeOperand { value });
    }
    Ok((value as f64).sqrt())
}

/// Outcome of a single trial division.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Division {
    /// The candidate divided the residual and is emitted as a factor.
    Factor(i64),
    /// The candidate did not divide; the next candidate will be tried.
    Advance,
}

/// Prime decomposition by trial division, one division per step.
///
/// Factors come out in non-decreasing order with multiplicity preserved. Once
/// `candidate² > residual` the residual is prime and is emitted directly.
#[derive(Debug, Clone)]
pub struct PrimeFactors {
    candidate: i64,
    residual: i64,
}

impl PrimeFactors {
    pub fn new(number: i64) -> Self {
        Self {
            candidate: 2,
            residual: number,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.residual <= 1
    }

    /// Performs one trial division, or returns `None` once the residual is 1.
    pub fn step(&mut self) -> Option<Division> {
        if self.is_exhausted() {
            return None;
        }

        if self.candidate > self.residual / self.candidate {
            let prime = self.residual;
            self.residual = 1;
            return Some(Division::Factor(prime));
        }

        if self.residual % self.candidate == 0 {
            self.residual /= self.candidate;
            return Some(Division::Factor(self.candidate));
        }

        // 2 is the only even candidate worth trying.
        self.candidate += if self.candidate == 2 { 1 } else { 2 };
        Some(Division::Advance)
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.step()? {
                Division::Factor(factor) => return Some(factor),
                Division::Advance => continue,
            }
        }
    }
}

/// Running arithmetic mean.
#[derive(Debug, Clone, Default)]
pub struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub fn push(&mut self, sample: f64) {
        self.sum += sample;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` until at least one sample was pushed.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Running maximum, starting from the identity `i64::MIN`.
#[derive(Debug, Clone)]
pub struct RunningMax {
    current: i64,
}

impl Default for RunningMax {
    fn default() -> Self {
        Self { current: i64::MIN }
    }
}

impl RunningMax {
    /// Folds `value` in and returns the maximum seen so far.
    pub fn observe(&mut self, value: i64) -> i64 {
        self.current = self.current.max(value);
        self.current
    }
}
