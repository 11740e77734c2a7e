//! Fixed-size chunking of file contents into blocks.
//!
//! Files split into consecutive `block_size` chunks; the final chunk may be
//! shorter. A zero-byte file yields exactly one empty chunk, so every file
//! has a non-empty manifest.

use bytes::Bytes;

use crate::block::Block;
use crate::hash::BlockHash;

/// Split data into fixed-size blocks.
#[must_use]
pub fn split(data: &[u8], block_size: usize) -> Vec<Block> {
    assert!(block_size > 0, "block size must be positive");

    if data.is_empty() {
        return vec![Block::new(Bytes::new())];
    }

    data.chunks(block_size)
        .map(|c| Block::new(Bytes::copy_from_slice(c)))
        .collect()
}

/// Compute the ordered hash list of the blocks `split` would produce,
/// without materializing the payloads.
#[must_use]
pub fn hashes(data: &[u8], block_size: usize) -> Vec<BlockHash> {
    assert!(block_size > 0, "block size must be positive");

    if data.is_empty() {
        return vec![BlockHash::of(b"")];
    }

    data.chunks(block_size).map(BlockHash::of).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_exact_multiple() {
        let data = vec![7u8; 8192];
        let blocks = split(&data, 4096);
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.len() == 4096));
    }

    #[test]
    fn test_split_short_tail() {
        // 10,000 bytes at 4096 -> 4096, 4096, 1808
        let data = vec![1u8; 10_000];
        let blocks = split(&data, 4096);
        let sizes: Vec<usize> = blocks.iter().map(Block::len).collect();
        assert_eq!(sizes, vec![4096, 4096, 1808]);
    }

    #[test]
    fn test_split_reassembles_byte_equal() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let blocks = split(&data, 4096);
        let mut rebuilt = Vec::new();
        for block in &blocks {
            rebuilt.extend_from_slice(&block.data);
        }
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_empty_input_yields_one_empty_block() {
        let blocks = split(b"", 4096);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].is_empty());
        assert_eq!(
            blocks[0].hash().to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hashes_match_split() {
        let data = vec![42u8; 9000];
        let from_split: Vec<BlockHash> = split(&data, 4096).iter().map(Block::hash).collect();
        assert_eq!(hashes(&data, 4096), from_split);
    }

    #[test]
    fn test_hashes_empty_input() {
        assert_eq!(hashes(b"", 4096), vec![BlockHash::of(b"")]);
    }

    #[test]
    fn test_small_input_single_block() {
        let blocks = split(b"Hello", 4096);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].len(), 5);
        assert_eq!(
            blocks[0].hash().to_hex(),
            "185f8db32271fe25f561a6fc938b2e264306ec304eda518007d1764826381969"
        );
    }
}
