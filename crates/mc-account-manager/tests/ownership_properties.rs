//! Property tests for the claim/evict write protocol.
//!
//! Whatever sequence of sets, creations and deletions runs, and whichever
//! backends refuse which values, every (account, key) of a known account is
//! held by at most one backend, and that backend is the recorded owner. A
//! deleted account has no owners left.

mod common;

use std::sync::Arc;

use common::{loaded, RecordingStorage};
use mc_account_manager::{Coordinator, OwnershipMap};
use mc_storage_core::{AccountManager, AccountStorage, EntryFlags, EntryKey, Value, ValueType};
use mc_storage_memory::{MemoryStorageConfig, SeedAccount};
use proptest::prelude::*;

const SEEDED: &str = "gabble/jabber/prop0";

#[derive(Debug, Clone)]
enum Op {
    Set {
        account: usize,
        key: usize,
        value: Option<String>,
    },
    Refuse { backend: usize, key: usize },
    Accept { backend: usize, key: usize },
    Create,
    Delete { account: usize },
}

fn keys() -> [EntryKey; 3] {
    [
        EntryKey::attribute("Nickname"),
        EntryKey::attribute("DisplayName"),
        EntryKey::parameter("server"),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..4usize, 0..3usize, prop::option::of("[a-z]{1,4}"))
            .prop_map(|(account, key, value)| Op::Set { account, key, value }),
        1 => (0..3usize, 0..3usize).prop_map(|(backend, key)| Op::Refuse { backend, key }),
        1 => (0..3usize, 0..3usize).prop_map(|(backend, key)| Op::Accept { backend, key }),
        1 => Just(Op::Create),
        1 => (0..4usize).prop_map(|account| Op::Delete { account }),
    ]
}

struct Names;

impl AccountManager for Names {
    fn unique_name(&self, manager: &str, protocol: &str, identification: &str) -> String {
        format!("{}/{}/{}0", manager, protocol, identification)
    }
}

fn holds(storage: &RecordingStorage, account: &str, key: &EntryKey) -> bool {
    match key {
        EntryKey::Attribute(name) => storage
            .get_attribute(&Names, account, name, ValueType::String)
            .is_some(),
        EntryKey::Parameter(name) => storage
            .get_parameter(&Names, account, name, None)
            .is_some(),
    }
}

fn check(
    coordinator: &Coordinator,
    backends: &[Arc<RecordingStorage>],
    seen: &[String],
) -> Result<(), TestCaseError> {
    let ownership: &OwnershipMap = coordinator.ownership();
    for account in seen {
        for key in keys() {
            let owner = ownership
                .owner(account, &key)
                .map(|id| coordinator.registry().name(id));

            if !coordinator.has_account(account) {
                prop_assert_eq!(owner, None, "{} of deleted {}", key, account);
                continue;
            }

            let holders: Vec<&str> = backends
                .iter()
                .filter(|b| holds(b, account, &key))
                .map(|b| b.name())
                .collect();
            prop_assert!(holders.len() <= 1, "{} of {} held by {:?}", key, account, holders);
            prop_assert_eq!(holders.first().copied(), owner, "owner of {} on {}", key, account);
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn at_most_one_backend_holds_each_key(
        priorities in prop::collection::vec(0..3i32, 3),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let backends: Vec<Arc<RecordingStorage>> = priorities
            .iter()
            .enumerate()
            .map(|(i, priority)| {
                RecordingStorage::seeded(
                    MemoryStorageConfig::new(format!("b{}", i), *priority),
                    &[(SEEDED, SeedAccount::default())],
                )
            })
            .collect();
        let mut coordinator = loaded(&backends);
        let keys = keys();
        let mut seen = vec![SEEDED.to_string()];

        for op in ops {
            match op {
                Op::Set { account, key, value } => {
                    let account = seen[account % seen.len()].clone();
                    let value = value.map(Value::String);
                    // Refused by everyone, or an already deleted account, is
                    // an allowed outcome.
                    let _ = match &keys[key] {
                        EntryKey::Attribute(name) => {
                            coordinator.set_attribute(&account, name, value.as_ref(), EntryFlags::NONE)
                        }
                        EntryKey::Parameter(name) => {
                            coordinator.set_parameter(&account, name, value.as_ref(), EntryFlags::NONE)
                        }
                    };
                }
                Op::Refuse { backend, key } => backends[backend].refuse(&keys[key].to_string()),
                Op::Accept { backend, key } => backends[backend].accept(&keys[key].to_string()),
                Op::Create => {
                    // Fresh identifiers, so a deleted name is never reused.
                    let identification = format!("c{}", seen.len());
                    if let Ok(account) = coordinator.create("gabble", "jabber", &identification) {
                        seen.push(account);
                    }
                }
                Op::Delete { account } => {
                    let account = seen[account % seen.len()].clone();
                    let _ = runtime.block_on(coordinator.delete(&account));
                }
            }
            check(&coordinator, &backends, &seen)?;
        }
    }
}
