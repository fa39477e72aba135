//! Generation-tagged token tables.
//!
//! A token is an opaque `u64` laid out as `[kind:8][generation:24][index:32]`.
//! Releasing a slot bumps its generation, so a stale token is told apart
//! from one that was never issued, and a reused slot never answers to an
//! old token.

use crate::error::{MemError, Result};
use std::mem;

/// Opaque handle handed across the boundary.
pub type Token = u64;

const GENERATION_MASK: u32 = 0x00ff_ffff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TokenKind {
    Connector = 1,
    View = 2,
}

fn encode(kind: TokenKind, generation: u32, index: u32) -> Token {
    ((kind as u64) << 56) | (((generation & GENERATION_MASK) as u64) << 32) | index as u64
}

fn decode(token: Token) -> (u8, u32, u32) {
    (
        (token >> 56) as u8,
        ((token >> 32) as u32) & GENERATION_MASK,
        token as u32,
    )
}

fn next_generation(generation: u32) -> u32 {
    match (generation + 1) & GENERATION_MASK {
        0 => 1,
        g => g,
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot table mapping tokens of one kind to live values.
#[derive(Debug)]
pub struct TokenTable<T> {
    kind: TokenKind,
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> TokenTable<T> {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// Number of values currently held.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Store `value` and issue a token for it.
    pub fn insert(&mut self, value: T) -> Result<Token> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| {
                    MemError::AllocationFailure {
                        bytes: mem::size_of::<Slot<T>>(),
                    }
                })?;
                self.slots
                    .try_reserve(1)
                    .map_err(|_| MemError::AllocationFailure {
                        bytes: mem::size_of::<Slot<T>>(),
                    })?;
                self.free
                    .try_reserve(1)
                    .map_err(|_| MemError::AllocationFailure {
                        bytes: mem::size_of::<u32>(),
                    })?;
                self.slots.push(Slot {
                    generation: 1,
                    value: None,
                });
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.value = Some(value);
        self.live += 1;
        Ok(encode(self.kind, slot.generation, index))
    }

    fn slot_index(&self, token: Token) -> Result<usize> {
        let (kind, generation, index) = decode(token);
        if kind != self.kind as u8 || generation == 0 {
            return Err(MemError::InvalidToken { token });
        }
        let slot = self
            .slots
            .get(index as usize)
            .ok_or(MemError::InvalidToken { token })?;
        match (slot.generation == generation, slot.value.is_some()) {
            (true, true) => Ok(index as usize),
            (false, _) if generation < slot.generation => Err(MemError::UseAfterRelease { token }),
            _ => Err(MemError::InvalidToken { token }),
        }
    }

    pub fn get(&self, token: Token) -> Result<&T> {
        let index = self.slot_index(token)?;
        self.slots[index]
            .value
            .as_ref()
            .ok_or(MemError::UseAfterRelease { token })
    }

    /// Take the value out and retire the token.
    pub fn remove(&mut self, token: Token) -> Result<T> {
        let index = self.slot_index(token)?;
        let slot = &mut self.slots[index];
        let value = slot
            .value
            .take()
            .ok_or(MemError::UseAfterRelease { token })?;
        slot.generation = next_generation(slot.generation);
        self.free.push(index as u32);
        self.live -= 1;
        Ok(value)
    }

    /// Drop every value, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let live = self.live;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = next_generation(slot.generation);
                self.free.push(index as u32);
            }
        }
        self.live = 0;
        live
    }
}
