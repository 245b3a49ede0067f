//! Property tests: whatever goes in comes back out, at every size.

use std::io::{Read, Write};

use proptest::prelude::*;
use spoolcrypt_core::crypto::IV_SIZE;
use spoolcrypt_core::{EncryptedItem, ItemConfig, KeySize};
use tempfile::TempDir;

fn key_size() -> impl Strategy<Value = KeySize> {
    prop_oneof![Just(KeySize::Aes128), Just(KeySize::Aes256)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_roundtrip_any_size(
        content in prop::collection::vec(any::<u8>(), 0..40_000),
        threshold in 0usize..20_000,
        chunk in 1usize..5_000,
        key_size in key_size(),
    ) {
        let dir = TempDir::new().unwrap();
        let config = ItemConfig {
            size_threshold: threshold,
            repository: Some(dir.path().to_path_buf()),
            default_charset: None,
            key_size,
        };
        let mut item = EncryptedItem::new("f", None, false, None, &config).unwrap();

        let mut out = item.output_stream().unwrap();
        for piece in content.chunks(chunk) {
            out.write_all(piece).unwrap();
        }
        out.close().unwrap();

        prop_assert_eq!(item.size(), content.len() as u64);
        prop_assert_eq!(item.is_in_memory(), content.len() <= threshold);

        let mut streamed = Vec::new();
        item.input_stream().unwrap().read_to_end(&mut streamed).unwrap();
        prop_assert_eq!(&streamed, &content);
        prop_assert_eq!(item.get().unwrap(), content.clone());

        if !item.is_in_memory() {
            let file = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
            let persisted = std::fs::read(file.path()).unwrap();
            prop_assert_eq!(persisted.len(), content.len() + IV_SIZE);
        }
    }
}
