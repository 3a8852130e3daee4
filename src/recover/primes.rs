/*
 * SPDX-FileCopyrightText: 2020 Stalwart Labs LLC <hello@stalw.art>
 *
 * SPDX-License-Identifier: Apache-2.0 OR MIT
 */

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::Zero;

/// Primes strictly below `bound`, sieve of Eratosthenes.
pub fn primes_below(bound: u32) -> Vec<u32> {
    let bound = bound as usize;
    if bound < 3 {
        return Vec::new();
    }

    let mut composite = vec![false; bound];
    let mut primes = Vec::new();
    for n in 2..bound {
        if !composite[n] {
            primes.push(n as u32);
            for multiple in (n * n..bound).step_by(n) {
                composite[multiple] = true;
            }
        }
    }
    primes
}

/// Divides out every power of each prime in `primes`.
pub fn strip_small_factors(mut value: BigUint, primes: &[u32]) -> BigUint {
    if value.is_zero() {
        return value;
    }
    for &p in primes {
        let p = BigUint::from(p);
        loop {
            let (quotient, remainder) = value.div_rem(&p);
            if !remainder.is_zero() {
                break;
            }
            value = quotient;
        }
    }
    value
}

#[cfg(test)]
mod test {
    use num_bigint::BigUint;

    use super::{primes_below, strip_small_factors};

    #[test]
    fn sieve() {
        assert_eq!(primes_below(0), Vec::<u32>::new());
        assert_eq!(primes_below(2), Vec::<u32>::new());
        assert_eq!(primes_below(3), vec![2]);
        assert_eq!(primes_below(30), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        let primes = primes_below(1500);
        assert_eq!(primes.len(), 239);
        assert_eq!(primes.last(), Some(&1499));
    }

    #[test]
    fn strip_factors() {
        let primes = primes_below(1500);
        let large = BigUint::parse_bytes(b"170141183460469231731687303715884105727", 10).unwrap();

        for (value, expected) in [
            (BigUint::from(2u32 * 2 * 3 * 1499), BigUint::from(1u32)),
            (&large * 8u32 * 1013u32 * 1013u32, large.clone()),
            (large.clone(), large.clone()),
            (BigUint::from(1511u32 * 4), BigUint::from(1511u32)),
            (BigUint::from(0u32), BigUint::from(0u32)),
        ] {
            assert_eq!(strip_small_factors(value, &primes), expected);
        }
    }
}
