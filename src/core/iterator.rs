use crate::core::{Block, Blockchain};
use crate::crypto::hash::Hash256;
use crate::{ChainError, Result};

/// Walks the chain from a starting hash back to genesis.
///
/// Yields an error and stops if a referenced block is missing from storage.
pub struct ChainIterator<'a> {
    current: Option<Hash256>,
    chain: &'a Blockchain,
}

impl<'a> ChainIterator<'a> {
    pub fn new(chain: &'a Blockchain, start: Hash256) -> Self {
        Self {
            current: Some(start),
            chain,
        }
    }
}

impl<'a> Iterator for ChainIterator<'a> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current.take()?;

        match self.chain.resolve_block(&hash) {
            Ok(Some(block)) => {
                self.current = block.previous_hash;
                Some(Ok(block))
            }
            Ok(None) => Some(Err(ChainError::Storage(format!("Block {} not found", hash)))),
            Err(e) => Some(Err(e)),
        }
    }
}
