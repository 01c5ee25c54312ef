//! Property coverage: buffer round trips and divisor self-heal.

#![allow(clippy::pedantic, clippy::nursery, clippy::cast_possible_truncation)]

use i2c_master_core::{
    decode_command, encode_command, Direction, Engine, EngineConfig, HostAccess, MemorySlave,
    TickInputs, Testbench, TransactionRequest,
};
use log as _;
use proptest::prelude::*;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

fn fast_config() -> EngineConfig {
    EngineConfig {
        default_divisor: 1,
        ..EngineConfig::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn property_write_then_read_round_trip(
        offset in 0usize..128,
        data in prop::collection::vec(any::<u8>(), 1..=127usize),
    ) {
        let mut tb = Testbench::new(fast_config(), MemorySlave::new(0x50)).unwrap();

        let status = tb.write_bytes(0x50, offset, &data, 200_000).unwrap();
        prop_assert!(!status.error);
        prop_assert_eq!(status.address, (offset + data.len()) & 0x7F);

        tb.load_buffer(offset, &vec![0; data.len()]).unwrap();
        let (status, bytes) = tb.read_bytes(0x50, offset, data.len(), 200_000).unwrap();
        prop_assert!(!status.error);
        prop_assert_eq!(status.remaining, 0);
        prop_assert_eq!(bytes, data);
    }

    #[test]
    fn property_speed_write_never_leaves_zero(value in any::<u32>()) {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.tick(TickInputs {
            host: Some(HostAccess::Write { offset: 1, value, lanes: 0b1111 }),
            ..TickInputs::default()
        });
        engine.tick(TickInputs::default());

        let masked = value & engine.config().divisor_mask();
        let expected = if masked == 0 { engine.config().default_divisor } else { masked };
        prop_assert_eq!(engine.divisor(), expected);
        prop_assert_ne!(engine.divisor(), 0);
    }

    #[test]
    fn property_command_word_round_trip(
        device in 0u8..0x80,
        read in any::<bool>(),
        offset in 0usize..128,
        count in 0usize..128,
    ) {
        let request = TransactionRequest {
            device,
            direction: if read { Direction::Read } else { Direction::Write },
            offset,
            count,
        };
        prop_assert_eq!(decode_command(encode_command(&request), 0x7F), request);
    }
}
