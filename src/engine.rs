//! Prime factor search over an inclusive range of candidate divisors.
//!
//! The engine is a pure function: no I/O, no state. Given a target and a
//! closed range `[low, high]`, it returns the prime factors of the target
//! found in that range, with multiplicity, in ascending order. All
//! arithmetic is on arbitrary-precision integers; protocol values may
//! exceed any fixed-width integer range.

use num_bigint::{BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};

/// Default certainty parameter for the probabilistic primality test.
/// A composite is accepted as prime with probability at most 2^-10.
pub const DEFAULT_CERTAINTY: u32 = 10;

/// Find all prime factors `x` of `target` with `low <= x <= high`.
///
/// Repeated prime factors appear once per occurrence, so the output is a
/// non-decreasing sequence with equal values adjacent. Returns an empty
/// vector when no prime in the range divides `target`, including the
/// degenerate `low > high` case where the candidate loop is never entered.
///
/// Requires `target >= 2`; the caller validates this before dispatching.
/// The range bounds are unconstrained: candidates below 2 are never prime
/// and are skipped naturally.
pub fn find_prime_factors(
    target: &BigUint,
    low: &BigUint,
    high: &BigUint,
    certainty: u32,
) -> Vec<BigUint> {
    let mut factors = Vec::new();
    let mut remaining = target.clone();

    // iterate over x from low to high
    let mut x = low.clone();
    while x <= *high {
        if is_probably_prime(&x, certainty) {
            while (&remaining % &x).is_zero() {
                factors.push(x.clone());
                remaining /= &x;
            }
        }
        x += 1u32;
    }

    factors
}

/// Miller-Rabin primality test with randomized witnesses.
///
/// Returns true if `n` is prime with false-positive probability at most
/// 2^-certainty for composite `n`; primes are never rejected. Each round
/// rules out a composite with probability at least 3/4, so
/// `ceil(certainty / 2)` rounds suffice.
pub fn is_probably_prime(n: &BigUint, certainty: u32) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if *n < two {
        return false;
    }
    if *n == two || *n == three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    // Write n - 1 = d * 2^s with d odd
    let n_minus_one = n - 1u32;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    let rounds = certainty.div_ceil(2).max(1);
    let mut rng = rand::thread_rng();

    'witness: for _ in 0..rounds {
        // witness in [2, n - 2]
        let a = rng.gen_biguint_range(&two, &n_minus_one);
        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = (&x * &x) % n;
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}
