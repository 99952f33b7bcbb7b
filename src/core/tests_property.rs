//! Property-based tests for the digest and block record

use super::constants::{MAX_DIFFICULTY, SENTINEL};
use super::*;
use proptest::prelude::*;

proptest! {
    #[test]
    fn digest_is_deterministic(
        prev in prop::collection::vec(any::<u8>(), 0..64),
        payload in prop::collection::vec(any::<u8>(), 0..256),
        created_at in any::<i64>(),
        nonce in any::<u64>()
    ) {
        let a = digest::compute(&prev, created_at, &payload, Nonce::new(nonce));
        let b = digest::compute(&prev, created_at, &payload, Nonce::new(nonce));
        prop_assert_eq!(a, b);
    }

    #[test]
    fn digest_changes_with_nonce(
        payload in prop::collection::vec(any::<u8>(), 0..64),
        nonce1 in any::<u64>(),
        nonce2 in any::<u64>()
    ) {
        prop_assume!(nonce1 != nonce2);
        let a = digest::compute(b"", 0, &payload, Nonce::new(nonce1));
        let b = digest::compute(b"", 0, &payload, Nonce::new(nonce2));
        prop_assert_ne!(a, b);
    }

    #[test]
    fn predicate_agrees_with_hex_prefix(
        bytes in prop::array::uniform32(any::<u8>()),
        difficulty in 0u32..=MAX_DIFFICULTY
    ) {
        let digest = Digest::from_bytes(bytes);
        let hex = digest.to_hex();
        let expected = hex.chars().take(difficulty as usize).all(|c| c == SENTINEL);
        prop_assert_eq!(Difficulty::new(difficulty).unwrap().is_met_by(&digest), expected);
    }

    #[test]
    fn advancing_keeps_block_consistent(
        payload in prop::collection::vec(any::<u8>(), 0..64),
        created_at in any::<i64>(),
        steps in 0usize..32
    ) {
        let mut block = Block::with_timestamp(payload, Vec::new(), created_at);
        for step in 0..steps {
            let digest = block.advance_nonce().unwrap();
            prop_assert_eq!(block.nonce().value(), step as u64 + 1);
            prop_assert_eq!(block.digest(), digest);
            prop_assert!(block.is_consistent());
        }
    }

    #[test]
    fn sealed_document_reproduces_digest(
        prev in prop::collection::vec(any::<u8>(), 0..32),
        payload in prop::collection::vec(any::<u8>(), 0..128),
        created_at in any::<i64>()
    ) {
        let sealed = SealedBlock::from_searched(
            Block::with_timestamp(payload, prev, created_at),
            Difficulty::NONE,
        );
        let json = sealed.to_json().unwrap();
        let restored = SealedBlock::from_json(&json).unwrap();
        prop_assert_eq!(restored.digest(), sealed.digest());
        prop_assert!(restored.as_block().is_consistent());
    }
}
