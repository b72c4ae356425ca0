use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimeError {
    #[error("Index should be positive")]
    NonPositiveIndex(i64),
}

/// The `n`-th prime, 1-based, by trial division against every smaller prime.
///
/// Deliberately quadratic-ish: it is meant to take long enough for large `n`
/// to run into a deadline.
pub fn nth_prime(n: i64) -> Result<u64, PrimeError> {
    if n < 1 {
        return Err(PrimeError::NonPositiveIndex(n));
    }

    let target = n as usize;
    let mut primes: Vec<u64> = Vec::with_capacity(target.min(1 << 20));
    primes.push(2);
    let mut current = 2u64;

    while primes.len() < target {
        current += 1;
        if primes.iter().all(|p| current % p != 0) {
            primes.push(current);
        }
    }

    Ok(primes[target - 1])
}
