use ndisk_storage::*;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn parts_assemble_by_position_in_any_completion_order(
        data in proptest::collection::vec(any::<u8>(), 1..4096),
        part_size in 64usize..700,
        seed in any::<u64>(),
    ) {
        let temp = tempfile::tempdir().unwrap();
        let assembled = runtime().block_on(async {
            let store = FsBlobStore::builder().root(temp.path()).connect().await.unwrap();
            let key = "prop0001";
            let upload = store.init_multipart(key, &MultipartOptions::default()).await.unwrap();

            let mut order: Vec<usize> = (0..data.chunks(part_size).count()).collect();
            // Deterministic shuffle driven by the generated seed.
            let mut state = seed | 1;
            for i in (1..order.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                let j = usize::try_from(state % (i as u64 + 1)).unwrap();
                order.swap(i, j);
            }

            let chunks: Vec<&[u8]> = data.chunks(part_size).collect();
            let mut parts = Vec::new();
            for index in order {
                let position = u32::try_from(index + 1).unwrap();
                parts.push(store.upload_part(position, chunks[index].to_vec(), key, &upload).await.unwrap());
            }
            store.complete_multipart(key, &upload, parts).await.unwrap();
            store.read(key).await.unwrap()
        });
        prop_assert_eq!(assembled, data);
    }
}
