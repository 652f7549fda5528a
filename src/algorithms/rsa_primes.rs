//! Recovery of the prime factors of an RSA modulus from `(n, e, d)`.
//!
//! JWKs are allowed to omit `p`, `q` and the CRT exponents. The factors are
//! found with the probabilistic method from Boneh, "Twenty Years of Attacks
//! on the RSA Cryptosystem" (Fact 1): `d·e − 1` is a multiple of the order of
//! every unit mod `n`, which exposes a non-trivial square root of 1.

use std::cmp::Ordering;

use boring::bn::{BigNum, BigNumContext, BigNumContextRef, BigNumRef};
use rand::{CryptoRng, RngCore};
use tracing::trace;

use crate::error::*;

/// Number of random bases tried before giving up.
pub const MAX_PRIME_RECOVERY_TRIALS: usize = 100;

/// The private CRT parameters of an RSA key.
pub struct CRTParameters {
    pub p: BigNum,
    pub q: BigNum,
    pub dp: BigNum,
    pub dq: BigNum,
    pub qi: BigNum,
}

fn failure(reason: &str) -> JWTError {
    JWTError::KeyInitializationFailure(reason.to_string())
}

fn eq(a: &BigNumRef, b: &BigNumRef) -> bool {
    a.ucmp(b) == Ordering::Equal
}

/// Uniform in `[1, n_minus_1]`, up to a 2^-64 bias.
fn random_base<R: RngCore + CryptoRng>(
    n_minus_1: &BigNumRef,
    rng: &mut R,
    ctx: &mut BigNumContextRef,
) -> Result<BigNum, Error> {
    let mut wide = vec![0u8; n_minus_1.num_bytes() as usize + 8];
    rng.fill_bytes(&mut wide);
    let wide = BigNum::from_slice(&wide)?;
    let mut g = BigNum::new()?;
    g.checked_rem(&wide, n_minus_1, ctx)?;
    g.add_word(1)?;
    Ok(g)
}

/// Find `(p, q)` such that `n = p·q`.
///
/// Fails with `KeyInitializationFailure` if `d·e − 1` is odd, or if no
/// factor was found after `MAX_PRIME_RECOVERY_TRIALS` random bases. Every
/// base counts as a trial.
pub fn recover_prime_factors<R: RngCore + CryptoRng>(
    n: &BigNumRef,
    e: &BigNumRef,
    d: &BigNumRef,
    rng: &mut R,
) -> Result<(BigNum, BigNum), Error> {
    ensure!(
        n.num_bits() > 2 && n.is_bit_set(0),
        failure("the modulus must be odd")
    );
    let mut ctx = BigNumContext::new()?;
    let one = BigNum::from_u32(1)?;
    let mut n_minus_1 = n.to_owned()?;
    n_minus_1.sub_word(1)?;

    let mut k = BigNum::new()?;
    k.checked_mul(d, e, &mut ctx)?;
    k.sub_word(1)?;
    ensure!(
        k.num_bits() > 0 && !k.is_bit_set(0),
        failure("d·e − 1 is not even, n, e and d are inconsistent")
    );
    let mut t = 0;
    while !k.is_bit_set(t) {
        t += 1;
    }
    let mut r = BigNum::new()?;
    r.rshift(&k, t)?;

    for trial in 1..=MAX_PRIME_RECOVERY_TRIALS {
        let g = random_base(&n_minus_1, rng, &mut ctx)?;
        let mut y = BigNum::new()?;
        y.mod_exp(&g, &r, n, &mut ctx)?;
        if eq(&y, &one) || eq(&y, &n_minus_1) {
            continue;
        }
        let mut root = None;
        for _ in 0..t {
            let mut x = BigNum::new()?;
            x.mod_mul(&y, &y, n, &mut ctx)?;
            if eq(&x, &one) {
                root = Some(y);
                break;
            }
            if eq(&x, &n_minus_1) {
                break;
            }
            y = x;
        }
        if let Some(mut root) = root {
            // root² ≡ 1 and root ≢ ±1, so gcd(root − 1, n) is a proper factor
            root.sub_word(1)?;
            let mut p = BigNum::new()?;
            p.gcd(&root, n, &mut ctx)?;
            let mut q = BigNum::new()?;
            q.checked_div(n, &p, &mut ctx)?;
            trace!(trials = trial, "recovered RSA prime factors");
            return Ok((p, q));
        }
    }
    bail!(failure("no prime factor found"))
}

/// Derive `dP = d mod (p−1)`, `dQ = d mod (q−1)` and `qInv = q⁻¹ mod p`.
pub fn crt_parameters(p: BigNum, q: BigNum, d: &BigNumRef) -> Result<CRTParameters, Error> {
    let mut ctx = BigNumContext::new()?;
    let one = BigNum::from_u32(1)?;
    let mut p_minus_1 = BigNum::new()?;
    p_minus_1.checked_sub(&p, &one)?;
    let mut q_minus_1 = BigNum::new()?;
    q_minus_1.checked_sub(&q, &one)?;

    let mut dp = BigNum::new()?;
    dp.checked_rem(d, &p_minus_1, &mut ctx)?;
    let mut dq = BigNum::new()?;
    dq.checked_rem(d, &q_minus_1, &mut ctx)?;
    let mut qi = BigNum::new()?;
    qi.mod_inverse(&q, &p, &mut ctx)
        .map_err(|_| failure("q is not invertible mod p"))?;
    Ok(CRTParameters { p, q, dp, dq, qi })
}
