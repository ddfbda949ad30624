//! Named 16-bit register cells.

use crate::bits::{self, BitStr, Bits};
use crate::constants::WORD_WIDTH;
use crate::error::SimulatorError;

/// A named, fixed-width (16-bit) register.
///
/// Writes narrower than a word are left-padded with zeroes; writes wider
/// than a word fail with [`SimulatorError::RegisterOverflow`].
#[derive(Clone, Debug)]
pub struct Register {
    name: String,
    general_purpose: bool,
    state: Bits,
}

impl Register {
    pub fn new(name: &str, general_purpose: bool) -> Register {
        Register {
            name: name.to_owned(),
            general_purpose,
            state: bits::zeroes(WORD_WIDTH),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn general_purpose(&self) -> bool {
        self.general_purpose
    }

    pub fn state(&self) -> &BitStr {
        &self.state
    }

    pub fn word(&self) -> u16 {
        bits::to_word(&self.state)
    }

    pub fn write(&mut self, value: &BitStr) -> Result<(), SimulatorError> {
        if value.len() > WORD_WIDTH {
            return Err(SimulatorError::RegisterOverflow {
                name: self.name.clone(),
                width: value.len(),
            });
        }
        let padded = bits::zeroes(WORD_WIDTH - value.len());
        self.state.clear();
        self.state.extend_from_bitslice(&padded);
        self.state.extend_from_bitslice(value);
        Ok(())
    }

    pub fn write_word(&mut self, value: u16) {
        self.state = bits::word_bits(value);
    }

    /// One bit of the state, MSB first.
    pub fn bit(&self, index: usize) -> bool {
        self.state[index]
    }

    pub fn set_bit(&mut self, index: usize, value: bool) {
        self.state.set(index, value);
    }

    pub fn to_hex(&self) -> String {
        bits::to_hex(&self.state)
    }
}
