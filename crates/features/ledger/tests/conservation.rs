mod fixtures;

use ndisk_domain::NamespaceEntry;
use ndisk_ledger::{Ledger, LedgerError, UploadRequest};
use proptest::prelude::*;

const USERS: usize = 3;
const FOLDER: &str = "box";

#[derive(Debug, Clone)]
enum Op {
    Upload { user: usize, content: u8, name: u8 },
    Copy { user: usize, pick: usize },
    Move { user: usize, pick: usize },
    Remove { user: usize, pick: usize },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..USERS, 0..4u8, 0..6u8).prop_map(|(user, content, name)| Op::Upload { user, content, name }),
        1 => (0..USERS, any::<usize>()).prop_map(|(user, pick)| Op::Copy { user, pick }),
        1 => (0..USERS, any::<usize>()).prop_map(|(user, pick)| Op::Move { user, pick }),
        2 => (0..USERS, any::<usize>()).prop_map(|(user, pick)| Op::Remove { user, pick }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

fn user(index: usize) -> String {
    format!("u-{index}")
}

struct Account {
    id: String,
    folder: NamespaceEntry,
}

impl Account {
    async fn files(&self, ledger: &Ledger) -> Vec<NamespaceEntry> {
        let mut files = ledger.children(&self.id, None).await.unwrap();
        files.extend(ledger.children(&self.id, Some(self.folder.uuid.as_str())).await.unwrap());
        files.retain(|entry| !entry.is_folder());
        files
    }

    async fn pick(&self, ledger: &Ledger, pick: usize) -> Option<NamespaceEntry> {
        let files = self.files(ledger).await;
        (!files.is_empty()).then(|| files[pick % files.len()].clone())
    }

    /// The folder on the other side of `entry`.
    fn other_side(&self, entry: &NamespaceEntry) -> Option<&str> {
        entry.is_top_level().then_some(self.folder.uuid.as_str())
    }
}

fn expected(result: Result<(), LedgerError>) {
    match result {
        Ok(()) | Err(LedgerError::NameConflict { .. } | LedgerError::QuotaExceeded { .. }) => {},
        Err(err) => panic!("unexpected failure: {err}"),
    }
}

async fn apply(ledger: &Ledger, accounts: &[Account], op: &Op) {
    match *op {
        Op::Upload { user, content, name } => {
            let data = vec![content; 10 * (usize::from(content) + 1)];
            let request = UploadRequest::new(user_id(accounts, user), &format!("file-{name}.bin"));
            expected(ledger.upload(request, &mut data.as_slice()).await.map(drop));
        },
        Op::Copy { user, pick } => {
            let account = &accounts[user];
            if let Some(entry) = account.pick(ledger, pick).await {
                let dest = account.other_side(&entry);
                expected(ledger.copy_entry(&account.id, &entry.uuid, dest).await.map(drop));
            }
        },
        Op::Move { user, pick } => {
            let account = &accounts[user];
            if let Some(entry) = account.pick(ledger, pick).await {
                let dest = account.other_side(&entry);
                expected(ledger.move_entries(&account.id, &[&entry.uuid], dest).await.map(drop));
            }
        },
        Op::Remove { user, pick } => {
            let account = &accounts[user];
            if let Some(entry) = account.pick(ledger, pick).await {
                expected(ledger.remove_entry(&account.id, &entry.uuid).await.map(drop));
            }
        },
    }
}

fn user_id(accounts: &[Account], index: usize) -> &str {
    &accounts[index].id
}

async fn check(ledger: &Ledger, accounts: &[Account]) {
    let audit = ledger.audit_links().await.unwrap();
    assert!(audit.is_consistent(), "link counts drifted: {:?}", audit.mismatches);

    for account in accounts {
        let mut charged = 0;
        for file in account.files(ledger).await {
            charged += ledger.blob(file.blob_uuid.as_deref().unwrap()).await.unwrap().size;
        }
        let usage = ledger.usage(&account.id).await.unwrap();
        assert_eq!(usage.now, charged, "volume of {} drifted", account.id);
        assert!(usage.now <= usage.total);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn links_and_volumes_match_the_namespace(ops in proptest::collection::vec(op(), 1..40)) {
        let temp = tempfile::tempdir().unwrap();
        runtime().block_on(async {
            let ledger = fixtures::ledger(&temp).await;
            let mut accounts = Vec::with_capacity(USERS);
            for index in 0..USERS {
                let id = user(index);
                ledger.open_account(&id, &format!("{id}@example.com"), 200).await.unwrap();
                let folder = ledger.create_folder(&id, None, FOLDER).await.unwrap();
                accounts.push(Account { id, folder });
            }

            for op in &ops {
                apply(&ledger, &accounts, op).await;
                check(&ledger, &accounts).await;
            }
            assert!(ledger.database().is_idle());
        });
    }
}
