//! Optimistic list store.
//!
//! Every mutation goes through the same three steps:
//!
//! 1. [`ListStore::begin`] snapshots the list, applies the change and
//!    publishes the new list to subscribers, all in one synchronous step.
//! 2. The matching request is sent through the [`SyncClient`].
//! 3. [`ListStore::settle`] keeps the optimistic list when the server
//!    accepted the change, or puts the snapshot back when it did not.
//!
//! Several mutations may be in flight at once, each holding the snapshot taken
//! when it began. Nothing orders them: a rollback restores that mutation's
//! snapshot wholesale, which also discards any mutation that began after it,
//! even one the server later accepts. Records are addressed by position, so a
//! mutation that begins after an optimistic removal already uses the shifted
//! indices.

use std::fmt::Display;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    sync::{self, SyncClient, SyncError},
    types::record::{Field, RepositoryRecord},
};

/// Deep copy of the list taken right before a mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot(Vec<RepositoryRecord>);

impl Snapshot {
    pub fn records(&self) -> &[RepositoryRecord] {
        &self.0
    }

    pub fn into_records(self) -> Vec<RepositoryRecord> {
        self.0
    }
}

/// A change the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetField {
        index: usize,
        field: Field,
        value: String,
    },
    Remove {
        index: usize,
    },
    Add,
}

impl Display for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mutation::SetField {
                index,
                field,
                value,
            } => write!(f, "set {field} of #{index} to {value:?}"),
            Mutation::Remove { index } => write!(f, "remove #{index}"),
            Mutation::Add => f.write_str("add a new repository"),
        }
    }
}

/// What has to be sent to the server to make a [`Mutation`] durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncRequest {
    UpdateField {
        index: usize,
        field: Field,
        value: String,
        old: String,
    },
    Delete {
        index: usize,
    },
    Create,
}

/// A mutation that has been applied locally and awaits the server.
#[derive(Debug)]
#[must_use = "a pending mutation must be settled"]
pub struct PendingMutation {
    mutation: Mutation,
    request: SyncRequest,
    snapshot: Snapshot,
}

impl PendingMutation {
    pub fn mutation(&self) -> &Mutation {
        &self.mutation
    }

    pub fn request(&self) -> &SyncRequest {
        &self.request
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmed {
    pub mutation: Mutation,
}

/// A mutation the server did not accept, after its snapshot was restored.
#[derive(Debug)]
pub struct RolledBack {
    pub mutation: Mutation,
    pub cause: SyncError,
    pub restored: Snapshot,
}

impl Display for RolledBack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "could not {}: {}", self.mutation, self.cause)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("repository #{index} does not exist, the list has {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{0}")]
    RolledBack(Box<RolledBack>),
}

impl MutationError {
    pub fn rolled_back(&self) -> Option<&RolledBack> {
        match self {
            MutationError::RolledBack(rolled_back) => Some(rolled_back),
            MutationError::IndexOutOfRange { .. } => None,
        }
    }
}

/// Applies `mutation` in place. The list is untouched when this fails.
fn apply(
    records: &mut Vec<RepositoryRecord>,
    mutation: &Mutation,
) -> Result<SyncRequest, MutationError> {
    let len = records.len();

    match mutation {
        Mutation::SetField {
            index,
            field,
            value,
        } => {
            let record = records
                .get_mut(*index)
                .ok_or(MutationError::IndexOutOfRange { index: *index, len })?;
            let old = record.set(*field, value.clone());

            Ok(SyncRequest::UpdateField {
                index: *index,
                field: *field,
                value: value.clone(),
                old,
            })
        }
        Mutation::Remove { index } => {
            if *index >= len {
                return Err(MutationError::IndexOutOfRange { index: *index, len });
            }

            records.remove(*index);

            Ok(SyncRequest::Delete { index: *index })
        }
        Mutation::Add => {
            records.push(RepositoryRecord::default());

            Ok(SyncRequest::Create)
        }
    }
}

/// Owns the repository list for a session.
pub struct ListStore<C> {
    client: C,
    state: watch::Sender<Vec<RepositoryRecord>>,
}

impl<C: SyncClient> ListStore<C> {
    /// Creates an empty store, call [`ListStore::fetch_all`] to populate it.
    pub fn new(client: C) -> Self {
        Self {
            client,
            state: watch::Sender::new(Vec::new()),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Receives every published list, optimistic or restored.
    pub fn subscribe(&self) -> watch::Receiver<Vec<RepositoryRecord>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.state.borrow().clone())
    }

    pub fn get(&self, index: usize) -> Option<RepositoryRecord> {
        self.state.borrow().get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    /// Replaces the list with the server's. Nothing changes when the fetch fails.
    pub async fn fetch_all(&self) -> sync::Result<usize> {
        let records = self.client.fetch_list().await?;
        let len = records.len();

        self.state.send_replace(records);
        debug!("loaded {len} repositories");

        Ok(len)
    }

    pub async fn set_field(
        &self,
        index: usize,
        field: Field,
        value: impl Into<String>,
    ) -> Result<Confirmed, MutationError> {
        self.mutate(Mutation::SetField {
            index,
            field,
            value: value.into(),
        })
        .await
    }

    pub async fn remove_record(&self, index: usize) -> Result<Confirmed, MutationError> {
        self.mutate(Mutation::Remove { index }).await
    }

    pub async fn add_new_record(&self) -> Result<Confirmed, MutationError> {
        self.mutate(Mutation::Add).await
    }

    /// Applies, sends and settles one mutation.
    pub async fn mutate(&self, mutation: Mutation) -> Result<Confirmed, MutationError> {
        let pending = self.begin(mutation)?;
        let outcome = self.send(pending.request()).await;

        self.settle(pending, outcome)
    }

    /// Snapshots, applies and publishes `mutation` without touching the network.
    pub fn begin(&self, mutation: Mutation) -> Result<PendingMutation, MutationError> {
        let mut outcome = None;

        self.state.send_if_modified(|records| {
            let snapshot = Snapshot(records.clone());
            let applied = apply(records, &mutation).map(|request| (request, snapshot));
            let modified = applied.is_ok();

            outcome = Some(applied);
            modified
        });

        let (request, snapshot) =
            outcome.expect("send_if_modified always runs the modify closure")?;

        debug!(%mutation, "applied optimistically");

        Ok(PendingMutation {
            mutation,
            request,
            snapshot,
        })
    }

    /// Sends the request for a pending mutation. A refusal becomes [`SyncError::Rejected`].
    pub async fn send(&self, request: &SyncRequest) -> sync::Result<()> {
        match request {
            SyncRequest::UpdateField {
                index,
                field,
                value,
                old,
            } => {
                let accepted = self
                    .client
                    .update_field(*index, *field, value, old)
                    .await?;

                if accepted {
                    Ok(())
                } else {
                    Err(SyncError::Rejected {
                        index: *index,
                        field: *field,
                    })
                }
            }
            SyncRequest::Delete { index } => self.client.delete_record(*index).await,
            SyncRequest::Create => self.client.create_record().await,
        }
    }

    /// Keeps the optimistic list on success, restores the snapshot otherwise.
    pub fn settle(
        &self,
        pending: PendingMutation,
        outcome: sync::Result<()>,
    ) -> Result<Confirmed, MutationError> {
        let PendingMutation {
            mutation, snapshot, ..
        } = pending;

        match outcome {
            Ok(()) => {
                info!(%mutation, "confirmed by server");

                Ok(Confirmed { mutation })
            }
            Err(cause) => {
                warn!(%mutation, "rolling back: {cause}");

                self.state.send_replace(snapshot.0.clone());

                Err(MutationError::RolledBack(Box::new(RolledBack {
                    mutation,
                    cause,
                    restored: snapshot,
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use reqwest::StatusCode;
    use tokio::sync::oneshot;
    use url::Url;

    use super::*;

    enum Reply {
        Accept,
        Reject,
        Fail,
        Wait(oneshot::Receiver<bool>),
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Fetch,
        Update {
            index: usize,
            field: Field,
            value: String,
            old: String,
        },
        Delete(usize),
        Create,
    }

    /// Answers from a queue of replies, accepting once the queue is empty.
    #[derive(Default)]
    struct ScriptedClient {
        list: Vec<RepositoryRecord>,
        fail_fetch: bool,
        replies: Mutex<VecDeque<Reply>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedClient {
        fn serving(list: Vec<RepositoryRecord>) -> Self {
            Self {
                list,
                ..Self::default()
            }
        }

        fn then(self, reply: Reply) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        async fn answer(&self, call: Call) -> sync::Result<bool> {
            self.calls.lock().unwrap().push(call);

            let reply = self.replies.lock().unwrap().pop_front();

            match reply.unwrap_or(Reply::Accept) {
                Reply::Accept => Ok(true),
                Reply::Reject => Ok(false),
                Reply::Fail => Err(server_error()),
                Reply::Wait(rx) => match rx.await {
                    Ok(accepted) => Ok(accepted),
                    Err(_) => Err(server_error()),
                },
            }
        }
    }

    fn server_error() -> SyncError {
        SyncError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            url: Url::parse("http://127.0.0.1:5000/api").unwrap(),
        }
    }

    #[async_trait::async_trait]
    impl SyncClient for ScriptedClient {
        async fn fetch_list(&self) -> sync::Result<Vec<RepositoryRecord>> {
            self.calls.lock().unwrap().push(Call::Fetch);

            if self.fail_fetch {
                return Err(server_error());
            }

            Ok(self.list.clone())
        }

        async fn update_field(
            &self,
            index: usize,
            field: Field,
            value: &str,
            old: &str,
        ) -> sync::Result<bool> {
            self.answer(Call::Update {
                index,
                field,
                value: value.to_string(),
                old: old.to_string(),
            })
            .await
        }

        async fn delete_record(&self, index: usize) -> sync::Result<()> {
            match self.answer(Call::Delete(index)).await? {
                true => Ok(()),
                false => Err(server_error()),
            }
        }

        async fn create_record(&self) -> sync::Result<()> {
            match self.answer(Call::Create).await? {
                true => Ok(()),
                false => Err(server_error()),
            }
        }
    }

    fn abc() -> Vec<RepositoryRecord> {
        vec![
            RepositoryRecord::new("git@a:x/a.git", "git@m:x/a.git"),
            RepositoryRecord::new("git@a:x/b.git", "git@m:x/b.git"),
            RepositoryRecord::new("git@a:x/c.git", ""),
        ]
    }

    async fn loaded(client: ScriptedClient) -> ListStore<ScriptedClient> {
        let store = ListStore::new(client);
        store.fetch_all().await.unwrap();
        store
    }

    #[tokio::test]
    async fn fetch_all_replaces_the_list() {
        let store = ListStore::new(ScriptedClient::serving(abc()));
        assert!(store.is_empty());

        assert_eq!(store.fetch_all().await.unwrap(), 3);
        assert_eq!(store.snapshot().into_records(), abc());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_the_list_alone() {
        let store = ListStore::new(ScriptedClient {
            fail_fetch: true,
            ..ScriptedClient::serving(abc())
        });

        assert!(store.fetch_all().await.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rejected_edit_restores_every_record() {
        let store = loaded(ScriptedClient::serving(abc()).then(Reply::Reject)).await;
        let before = store.snapshot();

        let err = store
            .set_field(1, Field::Source, "git@a:x/z.git")
            .await
            .unwrap_err();

        let rolled_back = err.rolled_back().unwrap();
        assert!(rolled_back.cause.is_rejection());
        assert_eq!(rolled_back.restored, before);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn transport_failure_also_rolls_back() {
        let store = loaded(ScriptedClient::serving(abc()).then(Reply::Fail)).await;
        let before = store.snapshot();

        let err = store.set_field(0, Field::Mirror, "").await.unwrap_err();

        assert!(err.rolled_back().unwrap().cause.is_transport());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn accepted_edit_changes_only_that_field() {
        let store = loaded(ScriptedClient::serving(abc())).await;

        store.set_field(2, Field::Source, "v").await.unwrap();

        let mut expected = abc();
        expected[2].source = "v".into();
        assert_eq!(store.snapshot().into_records(), expected);
    }

    #[tokio::test]
    async fn edit_sends_new_and_old_value() {
        let client = ScriptedClient::serving(vec![RepositoryRecord::new("s", "old")]);
        let store = loaded(client).await;

        store.set_field(0, Field::Mirror, "new").await.unwrap();

        assert_eq!(
            store.client().calls(),
            vec![
                Call::Fetch,
                Call::Update {
                    index: 0,
                    field: Field::Mirror,
                    value: "new".into(),
                    old: "old".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn removal_shifts_then_failure_restores_order() {
        let store = loaded(ScriptedClient::serving(abc())).await;
        let [a, b, c] = <[RepositoryRecord; 3]>::try_from(abc()).unwrap();

        let pending = store.begin(Mutation::Remove { index: 1 }).unwrap();
        assert_eq!(pending.mutation(), &Mutation::Remove { index: 1 });
        assert_eq!(pending.snapshot().records(), abc().as_slice());
        assert_eq!(
            store.snapshot().into_records(),
            vec![a.clone(), c.clone()]
        );
        assert_eq!(pending.request(), &SyncRequest::Delete { index: 1 });

        store.settle(pending, Err(server_error())).unwrap_err();
        assert_eq!(store.snapshot().into_records(), vec![a, b, c]);
    }

    #[tokio::test]
    async fn addition_appends_empty_record() {
        let two = abc()[..2].to_vec();
        let store = loaded(ScriptedClient::serving(two.clone())).await;

        let pending = store.begin(Mutation::Add).unwrap();
        let mut expected = two.clone();
        expected.push(RepositoryRecord::new("", ""));
        assert_eq!(store.snapshot().into_records(), expected);

        store.settle(pending, Err(server_error())).unwrap_err();
        assert_eq!(store.snapshot().into_records(), two);
    }

    #[tokio::test]
    async fn confirmed_add_and_remove_keep_optimistic_state() {
        let store = loaded(ScriptedClient::serving(abc())).await;

        store.add_new_record().await.unwrap();
        store.remove_record(0).await.unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(2), Some(RepositoryRecord::default()));
        assert_eq!(
            store.client().calls(),
            vec![Call::Fetch, Call::Create, Call::Delete(0)]
        );
    }

    #[tokio::test]
    async fn out_of_range_index_sends_nothing() {
        let store = loaded(ScriptedClient::serving(abc())).await;
        let mut updates = store.subscribe();
        updates.mark_unchanged();

        let err = store.remove_record(3).await.unwrap_err();
        assert!(matches!(
            err,
            MutationError::IndexOutOfRange { index: 3, len: 3 }
        ));

        let err = store.set_field(7, Field::Source, "x").await.unwrap_err();
        assert!(err.rolled_back().is_none());

        assert!(!updates.has_changed().unwrap());
        assert_eq!(store.client().calls(), vec![Call::Fetch]);
    }

    #[tokio::test]
    async fn optimistic_state_is_published_before_the_server_answers() {
        let store = loaded(ScriptedClient::serving(abc())).await;
        let mut updates = store.subscribe();
        updates.mark_unchanged();

        let pending = store
            .begin(Mutation::SetField {
                index: 0,
                field: Field::Source,
                value: "fast".into(),
            })
            .unwrap();

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update()[0].source, "fast");

        store.settle(pending, Err(server_error())).unwrap_err();

        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update()[0].source, "git@a:x/a.git");
    }

    #[tokio::test]
    async fn each_mutation_restores_its_own_snapshot() {
        let store = loaded(ScriptedClient::serving(abc())).await;

        let first = store
            .begin(Mutation::SetField {
                index: 0,
                field: Field::Source,
                value: "first".into(),
            })
            .unwrap();
        store.settle(first, Err(server_error())).unwrap_err();

        let second = store
            .begin(Mutation::SetField {
                index: 1,
                field: Field::Mirror,
                value: "second".into(),
            })
            .unwrap();
        store.settle(second, Ok(())).unwrap();

        let mut expected = abc();
        expected[1].mirror = "second".into();
        assert_eq!(store.snapshot().into_records(), expected);
    }

    #[tokio::test]
    async fn late_rollback_discards_mutations_issued_after_it() {
        let (release, gate) = oneshot::channel();
        let client = ScriptedClient::serving(abc())
            .then(Reply::Wait(gate))
            .then(Reply::Accept);
        let store = loaded(client).await;

        let (first, second, ()) = tokio::join!(
            store.set_field(0, Field::Source, "first"),
            store.set_field(1, Field::Source, "second"),
            async {
                release.send(false).unwrap();
            }
        );

        assert!(first.unwrap_err().rolled_back().is_some());
        assert!(second.is_ok());
        // The first snapshot predates the second edit, so it is gone too.
        assert_eq!(store.snapshot().into_records(), abc());
    }

    #[tokio::test]
    async fn index_after_pending_removal_is_already_shifted() {
        let store = loaded(ScriptedClient::serving(abc())).await;

        let removal = store.begin(Mutation::Remove { index: 0 }).unwrap();
        let edit = store
            .begin(Mutation::SetField {
                index: 0,
                field: Field::Mirror,
                value: "m".into(),
            })
            .unwrap();

        // Position 0 now holds what used to be record 1.
        assert_eq!(
            edit.request(),
            &SyncRequest::UpdateField {
                index: 0,
                field: Field::Mirror,
                value: "m".into(),
                old: "git@m:x/b.git".into(),
            }
        );

        store.settle(removal, Ok(())).unwrap();
        store.settle(edit, Ok(())).unwrap();
        assert_eq!(store.get(0).unwrap().display_name(), "b");
    }

    #[tokio::test]
    async fn fetch_edit_reject_scenario() {
        let client = ScriptedClient::serving(vec![RepositoryRecord::new("s1", "m1")]);
        let (release, gate) = oneshot::channel();
        let store = loaded(client.then(Reply::Wait(gate))).await;
        let updates = store.subscribe();

        let (result, ()) = tokio::join!(store.set_field(0, Field::Source, "s2"), async {
            assert_eq!(updates.borrow()[0].source, "s2");
            release.send(false).unwrap();
        });

        assert!(result.unwrap_err().rolled_back().unwrap().cause.is_rejection());
        assert_eq!(store.get(0), Some(RepositoryRecord::new("s1", "m1")));
    }
}
