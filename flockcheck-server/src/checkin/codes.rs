//! Daily security codes printed on child and parent labels.
//!
//! A code is unique within its issue date only; the same code may be issued
//! again on another day.

use chrono::NaiveDate;
use rand::Rng;
use serde::Deserialize;

use super::CheckinError;

const NUMERIC: &[u8] = b"0123456789";
// No I or O: they read as 1 and 0 on printed labels
const ALPHA: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const ALPHANUMERIC: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeAlphabet {
    Numeric,
    Alpha,
    Alphanumeric,
}

impl CodeAlphabet {
    pub fn symbols(self) -> &'static [u8] {
        match self {
            CodeAlphabet::Numeric => NUMERIC,
            CodeAlphabet::Alpha => ALPHA,
            CodeAlphabet::Alphanumeric => ALPHANUMERIC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeConfig {
    pub length: usize,
    pub alphabet: CodeAlphabet,
    pub max_attempts: u32,
}

impl CodeConfig {
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let symbols = self.alphabet.symbols();
        (0..self.length)
            .map(|_| symbols[rng.gen_range(0..symbols.len())] as char)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedCode {
    pub id: i32,
    pub code: String,
}

/// Claims a code under the (issue date, code) uniqueness constraint.
pub trait CodeReserver {
    /// Returns the new row id, or `None` when the code is already taken that day.
    fn try_reserve(&mut self, issue_date: NaiveDate, code: &str) -> Result<Option<i32>, CheckinError>;
}

/// Generates candidates until one reserves, giving up after
/// `config.max_attempts` collisions.
pub fn issue<S, R>(
    reserver: &mut S,
    config: &CodeConfig,
    issue_date: NaiveDate,
    rng: &mut R,
) -> Result<ReservedCode, CheckinError>
where
    S: CodeReserver + ?Sized,
    R: Rng + ?Sized,
{
    for attempt in 1..=config.max_attempts {
        let code = config.generate(rng);
        if let Some(id) = reserver.try_reserve(issue_date, &code)? {
            if attempt > 1 {
                tracing::debug!(attempt, %issue_date, "codes: reserved after collisions");
            }
            return Ok(ReservedCode { id, code });
        }
    }
    tracing::error!(
        attempts = config.max_attempts,
        %issue_date,
        length = config.length,
        alphabet = ?config.alphabet,
        "codes: code space exhausted; widen the alphabet or length"
    );
    Err(CheckinError::CodeSpaceExhausted {
        attempts: config.max_attempts,
    })
}
