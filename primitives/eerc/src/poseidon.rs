//! Poseidon over BN254 with the circom parameter sets.
//!
//! [`hash`] is the standard circom Poseidon (`poseidonN`). The cipher is the
//! duplex-sponge construction of the circomlib/zk-kit Poseidon cipher over the
//! width-4 permutation:
//!
//! ```text
//! state = [0, key.x, key.y, nonce + len·2^128]
//! for each 3-element block m:  state = perm(state); state[1..4] += m; emit state[1..4]
//! state = perm(state); emit state[1]                                  (tag)
//! ```
//!
//! A message of `len` elements yields `⌈len/3⌉·3 + 1` ciphertext elements.

use ark_ff::{Field as _, Zero};
use lazy_static::lazy_static;
use light_poseidon::{Poseidon, PoseidonHasher, PoseidonParameters, parameters::bn254_x5};

use crate::PrimitiveError;
use crate::babyjub::Point;
use crate::field::{Field, fits_u128, two_pow_128};

/// Permutation width used by the cipher.
pub const CIPHER_WIDTH: usize = 4;
const RATE: usize = CIPHER_WIDTH - 1;

lazy_static! {
    static ref PARAMS_T4: Result<PoseidonParameters<Field>, PrimitiveError> =
        bn254_x5::get_poseidon_parameters::<Field>(CIPHER_WIDTH as u8)
            .map_err(|e| PrimitiveError::Poseidon(format!("{e:?}")));
}

/// The width-4 circom Poseidon permutation, in place.
pub fn permute(state: &mut [Field; CIPHER_WIDTH]) -> Result<(), PrimitiveError> {
    let p = PARAMS_T4.as_ref().map_err(Clone::clone)?;
    let half_full = p.full_rounds / 2;
    let rounds = p.full_rounds + p.partial_rounds;

    for round in 0..rounds {
        for (i, s) in state.iter_mut().enumerate() {
            *s += p.ark[round * p.width + i];
        }

        if round < half_full || round >= half_full + p.partial_rounds {
            for s in state.iter_mut() {
                *s = s.pow([p.alpha]);
            }
        } else {
            state[0] = state[0].pow([p.alpha]);
        }

        let prev = *state;
        for (i, s) in state.iter_mut().enumerate() {
            *s = prev
                .iter()
                .zip(p.mds[i].iter())
                .fold(Field::zero(), |acc, (v, m)| acc + *v * m);
        }
    }
    Ok(())
}

/// circom `Poseidon(n)` over `inputs`.
pub fn hash(inputs: &[Field]) -> Result<Field, PrimitiveError> {
    let mut hasher = Poseidon::<Field>::new_circom(inputs.len())
        .map_err(|e| PrimitiveError::Poseidon(format!("{e:?}")))?;
    hasher
        .hash(inputs)
        .map_err(|e| PrimitiveError::Poseidon(format!("{e:?}")))
}

/// Number of ciphertext elements produced for a `length`-element message.
pub fn ciphertext_len(length: usize) -> usize {
    length.div_ceil(RATE) * RATE + 1
}

fn initial_state(key: &Point, nonce: Field, length: usize) -> [Field; CIPHER_WIDTH] {
    [
        Field::zero(),
        key.x,
        key.y,
        nonce + Field::from(length as u64) * two_pow_128(),
    ]
}

/// Encrypt `message` under the shared point `key`.
pub fn encrypt(message: &[Field], key: &Point, nonce: Field) -> Result<Vec<Field>, PrimitiveError> {
    if !fits_u128(&nonce) {
        return Err(PrimitiveError::NonceOutOfRange);
    }

    let mut padded = message.to_vec();
    padded.resize(message.len().div_ceil(RATE) * RATE, Field::zero());

    let mut state = initial_state(key, nonce, message.len());
    let mut ciphertext = Vec::with_capacity(ciphertext_len(message.len()));

    for block in padded.chunks(RATE) {
        permute(&mut state)?;
        for (i, m) in block.iter().enumerate() {
            state[i + 1] += m;
            ciphertext.push(state[i + 1]);
        }
    }

    permute(&mut state)?;
    ciphertext.push(state[1]);
    Ok(ciphertext)
}

/// Decrypt a `length`-element message, verifying padding and the tag.
pub fn decrypt(
    ciphertext: &[Field],
    key: &Point,
    nonce: Field,
    length: usize,
) -> Result<Vec<Field>, PrimitiveError> {
    if !fits_u128(&nonce) {
        return Err(PrimitiveError::NonceOutOfRange);
    }
    let expected = ciphertext_len(length);
    if ciphertext.len() != expected {
        return Err(PrimitiveError::CiphertextLength {
            got: ciphertext.len(),
            expected,
            length,
        });
    }

    let (body, tag) = ciphertext.split_at(expected - 1);
    let mut state = initial_state(key, nonce, length);
    let mut message = Vec::with_capacity(body.len());

    for block in body.chunks(RATE) {
        permute(&mut state)?;
        for (i, c) in block.iter().enumerate() {
            message.push(*c - state[i + 1]);
            state[i + 1] = *c;
        }
    }

    if message[length..].iter().any(|m| !m.is_zero()) {
        return Err(PrimitiveError::InvalidPadding);
    }

    permute(&mut state)?;
    if state[1] != tag[0] {
        return Err(PrimitiveError::TagMismatch);
    }

    message.truncate(length);
    Ok(message)
}
