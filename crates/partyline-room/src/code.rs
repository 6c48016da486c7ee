//! Room code generation.
//!
//! Codes are five characters from an alphabet with the easily confused
//! glyphs (`I`, `L`, `O`, `0`, `1`) removed, so players can read them
//! aloud and type them on a phone.

use partyline_protocol::RoomCode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Characters a room code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of every generated room code.
pub const CODE_LEN: usize = 5;

/// Source of candidate room codes.
///
/// The registry checks each candidate against live rooms and asks again on
/// a collision, so implementations need not guarantee uniqueness.
/// Any `FnMut() -> RoomCode` closure is a generator.
pub trait CodeGenerator: Send + 'static {
    /// Produces the next candidate code.
    fn generate(&mut self) -> RoomCode;
}

impl<F> CodeGenerator for F
where
    F: FnMut() -> RoomCode + Send + 'static,
{
    fn generate(&mut self) -> RoomCode {
        self()
    }
}

/// Uniformly random codes over [`CODE_ALPHABET`].
pub struct RandomCodes {
    rng: StdRng,
}

impl RandomCodes {
    /// Seeds from the operating system.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic sequence, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomCodes {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeGenerator for RandomCodes {
    fn generate(&mut self) -> RoomCode {
        let code: String = (0..CODE_LEN)
            .map(|_| {
                let idx = self.rng.random_range(0..CODE_ALPHABET.len());
                char::from(CODE_ALPHABET[idx])
            })
            .collect();
        RoomCode::from(code)
    }
}

/// Returns `true` if `code` has the shape of a generated room code.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
