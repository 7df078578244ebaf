use crate::oracle::SearchSpace;
use fixedbitset::FixedBitSet;
use num_bigint::BigUint;
use num_traits::One;

/// All primes `<= limit` via a sieve of Eratosthenes.
pub fn primes_up_to(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return Vec::new();
    }
    let size = limit as usize + 1;
    let mut composite = FixedBitSet::with_capacity(size);
    composite.insert(0);
    composite.insert(1);

    let mut p = 2usize;
    while p * p < size {
        if !composite.contains(p) {
            let mut multiple = p * p;
            while multiple < size {
                composite.insert(multiple);
                multiple += p;
            }
        }
        p += 1;
    }

    composite.zeroes().map(|i| i as u64).collect()
}

/// Upper bound on the n-th prime (Rosser: n(ln n + ln ln n) for n >= 6).
fn nth_prime_upper_bound(n: u64) -> u64 {
    if n < 6 {
        return 15;
    }
    let x = n as f64;
    (x * (x.ln() + x.ln().ln())).ceil() as u64 + 1
}

/// The first `count` primes.
pub fn first_primes(count: usize) -> Vec<u64> {
    if count == 0 {
        return Vec::new();
    }
    let mut primes = primes_up_to(nth_prime_upper_bound(count as u64));
    primes.truncate(count);
    primes
}

/// The n-th prime, 1-indexed. `nth_prime(0)` is treated as 2.
pub fn nth_prime(n: u64) -> u64 {
    let n = n.max(1) as usize;
    first_primes(n).last().copied().unwrap_or(2)
}

/// Product of the first `n` primes; `primorial(0) == 1`.
pub fn primorial(n: u64) -> BigUint {
    first_primes(n as usize)
        .into_iter()
        .fold(BigUint::one(), |acc, p| acc * p)
}

/// Fortunate-number search space: base is the primorial of the index and
/// the first candidate offset is the next prime after its largest factor.
///
/// Every offset in `(1, p_{n+1})` shares a factor with `p_n#`, so nothing
/// below `p_{n+1}` can qualify.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrimorialSpace;

impl SearchSpace for PrimorialSpace {
    fn lower_bound_for(&self, index: u64) -> u64 {
        nth_prime(index + 1)
    }

    fn base_for(&self, index: u64) -> BigUint {
        primorial(index)
    }
}
