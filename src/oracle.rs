use crate::primes::first_primes;
use crate::ExpeditionError;
use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Largest number of distinct prime witnesses the Miller-Rabin oracle uses.
pub const MAX_ROUNDS: u32 = 64;

/// Primes used for cheap trial division before the expensive rounds.
const TRIAL_DIVISION_LIMIT: u64 = 1000;

/// Numeric helpers describing the independent search problems.
pub trait SearchSpace: Send + Sync {
    /// Smallest offset worth testing for `index`.
    fn lower_bound_for(&self, index: u64) -> u64;
    /// Value the offset is added to before testing.
    fn base_for(&self, index: u64) -> BigUint;
}

/// Predicate deciding whether `base + offset` qualifies. Must be pure.
pub trait Oracle: Send + Sync {
    fn is_qualifying(&self, base: &BigUint, offset: u64) -> bool;

    /// Upper bound on the false-positive rate; 0 for exact predicates.
    fn error_bound(&self) -> f64 {
        0.0
    }

    fn name(&self) -> &str;
}

/// Probabilistic primality oracle: trial division, then strong
/// probable-prime rounds with the first `rounds` primes as witnesses.
#[derive(Debug, Clone)]
pub struct MillerRabin {
    rounds: u32,
    witnesses: Vec<u64>,
    small_primes: Vec<u64>,
}

impl MillerRabin {
    pub fn new(rounds: u32) -> Result<Self, ExpeditionError> {
        if rounds == 0 || rounds > MAX_ROUNDS {
            return Err(ExpeditionError::Config(format!(
                "Miller-Rabin rounds must be within 1..={}, got {}",
                MAX_ROUNDS, rounds
            )));
        }
        let small_primes = crate::primes::primes_up_to(TRIAL_DIVISION_LIMIT);
        Ok(Self {
            rounds,
            witnesses: first_primes(rounds as usize),
            small_primes,
        })
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn is_probable_prime(&self, n: &BigUint) -> bool {
        let two = BigUint::from(2u32);
        if *n < two {
            return false;
        }

        for &p in &self.small_primes {
            if *n == BigUint::from(p) {
                return true;
            }
            if (n % p).is_zero() {
                return false;
            }
        }

        let n_minus_one = n - 1u32;
        let Some(shift) = n_minus_one.trailing_zeros() else {
            return false;
        };
        let d = &n_minus_one >> shift;

        'witness: for &w in &self.witnesses {
            let a = BigUint::from(w);
            if a >= n_minus_one {
                continue;
            }

            let mut x = a.modpow(&d, n);
            if x.is_one() || x == n_minus_one {
                continue;
            }
            for _ in 1..shift {
                x = x.modpow(&two, n);
                if x == n_minus_one {
                    continue 'witness;
                }
            }
            return false;
        }

        true
    }
}

impl Oracle for MillerRabin {
    fn is_qualifying(&self, base: &BigUint, offset: u64) -> bool {
        let candidate = base + offset;
        self.is_probable_prime(&candidate)
    }

    fn error_bound(&self) -> f64 {
        0.25f64.powi(self.rounds as i32)
    }

    fn name(&self) -> &str {
        "Miller-Rabin"
    }
}
