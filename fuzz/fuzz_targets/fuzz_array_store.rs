#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use packstore::data::EntryRef;
use packstore::store::{ArrayStore, ArrayStoreConfig};

#[derive(Arbitrary, Debug)]
struct ArrayStoreInput {
    operations: Vec<StoreOp>,
}

#[derive(Arbitrary, Debug)]
enum StoreOp {
    Add { values: Vec<u32> },
    Get { slot: u16 },
    Remove { slot: u16 },
    TransferAndTrim,
    Compact,
    CheckUsage,
}

fuzz_target!(|input: ArrayStoreInput| {
    // Limit operations
    if input.operations.len() > 200 {
        return;
    }

    let mut store: ArrayStore<u32> =
        ArrayStore::new(ArrayStoreConfig::new(4).with_cluster_bounds(4, 256)).unwrap();
    // Oracle: slot -> (ref, expected values). Slots removed from the map
    // have been handed to the hold list.
    let mut expected: Vec<(EntryRef, Vec<u32>)> = Vec::new();
    let mut generation = 1u64;

    for op in input.operations {
        match op {
            StoreOp::Add { values } => {
                // Limit array size
                if values.len() > 512 {
                    continue;
                }
                match store.add(&values) {
                    Ok(r) => {
                        assert_eq!(r.valid(), !values.is_empty());
                        if r.valid() {
                            assert_eq!(store.get(r), values.as_slice());
                            expected.push((r, values));
                        }
                    }
                    Err(_) => {
                        // Address space pressure; the store must stay
                        // usable for existing refs.
                    }
                }
            }
            StoreOp::Get { slot } => {
                if expected.is_empty() {
                    continue;
                }
                let (r, values) = &expected[slot as usize % expected.len()];
                assert_eq!(store.get(*r), values.as_slice());
            }
            StoreOp::Remove { slot } => {
                if expected.is_empty() {
                    continue;
                }
                let (r, _) = expected.swap_remove(slot as usize % expected.len());
                store.remove(r);
            }
            StoreOp::TransferAndTrim => {
                store.transfer_hold_lists(generation);
                generation += 1;
                store.trim_hold_lists(generation - 1);

                // Live entries survive reclamation.
                for (r, values) in &expected {
                    assert_eq!(store.get(*r), values.as_slice());
                }
            }
            StoreOp::Compact => {
                let mut refs: Vec<EntryRef> = expected.iter().map(|(r, _)| *r).collect();
                if let Ok(Some(mut ctx)) = store.compact_worst() {
                    ctx.compact(&mut refs).unwrap();
                    drop(ctx);
                    for ((r, _), new_ref) in expected.iter_mut().zip(refs) {
                        *r = new_ref;
                    }
                }
                for (r, values) in &expected {
                    assert_eq!(store.get(*r), values.as_slice());
                }
            }
            StoreOp::CheckUsage => {
                let usage = store.address_space_usage();
                assert!(usage.used <= usage.total);
                let memory = store.memory_usage();
                assert!(memory.used_bytes <= memory.allocated_bytes + memory.held_bytes);
            }
        }
    }
});
