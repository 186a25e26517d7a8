use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use futures::stream::{select_all, BoxStream, SelectAll};
use futures::StreamExt;
use mc_storage_core::{EntryFlags, EntryKey, SetResult, StorageError, StorageEvent, Value, ValueType};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::coordinator::{AccountView, CommitReport, Coordinator, StorageInfo};
use crate::error::{AccountError, Result};
use crate::identity::AccountIdentifier;
use crate::registry::BackendId;
use crate::relay::AccountEvent;

type SignalStream = BoxStream<'static, (BackendId, std::result::Result<StorageEvent, BroadcastStreamRecvError>)>;

enum Request {
    Accounts {
        reply: oneshot::Sender<Vec<String>>,
    },
    Owner {
        account: String,
        key: EntryKey,
        reply: oneshot::Sender<Option<String>>,
    },
    GetAttribute {
        account: String,
        attribute: String,
        expected: ValueType,
        reply: oneshot::Sender<Result<Option<Value>>>,
    },
    GetParameter {
        account: String,
        parameter: String,
        expected: Option<ValueType>,
        reply: oneshot::Sender<Result<Option<Value>>>,
    },
    ListParameters {
        account: String,
        typed: bool,
        reply: oneshot::Sender<Vec<String>>,
    },
    Set {
        account: String,
        key: EntryKey,
        value: Option<Value>,
        flags: EntryFlags,
        reply: oneshot::Sender<Result<SetResult>>,
    },
    Create {
        manager: String,
        protocol: String,
        identification: String,
        reply: oneshot::Sender<Result<String>>,
    },
    Delete {
        account: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Commit {
        account: Option<String>,
        reply: oneshot::Sender<Result<CommitReport>>,
    },
    StorageInfo {
        account: String,
        reply: oneshot::Sender<Result<StorageInfo>>,
    },
    Snapshot {
        account: Option<String>,
        reply: oneshot::Sender<Vec<AccountView>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// A backend delete that finished on its own task.
struct DeleteCompletion {
    account: String,
    result: std::result::Result<(), StorageError>,
    reply: oneshot::Sender<Result<()>>,
}

/// The coordinating task: owns the coordinator and handles requests, delete
/// completions and backend signals one at a time.
struct Service {
    coordinator: Coordinator,
    requests: mpsc::UnboundedReceiver<Request>,
    completions_tx: mpsc::UnboundedSender<DeleteCompletion>,
    completions: mpsc::UnboundedReceiver<DeleteCompletion>,
    signals: SelectAll<SignalStream>,
    events: broadcast::Sender<AccountEvent>,
}

impl Coordinator {
    /// Move the coordinator onto its own task and start serving. Loads first
    /// if `load` was not called.
    pub fn start(mut self) -> AccountManagerHandle {
        if !self.loaded {
            warn!("Starting before load(); loading now");
            self.load();
        }

        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(self.config.event_capacity);

        let signals = select_all(self.receivers.drain(..).map(|(id, receiver)| {
            BroadcastStream::new(receiver)
                .map(move |item| (id, item))
                .boxed()
        }));

        let handle = AccountManagerHandle {
            requests: requests_tx,
            events: events.clone(),
            identifier: self.identifier.clone(),
        };

        let service = Service {
            coordinator: self,
            requests,
            completions_tx,
            completions,
            signals,
            events,
        };
        tokio::spawn(service.run());
        info!("Account manager started");

        handle
    }
}

impl Service {
    async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => {
                        if self.handle_request(request).is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                Some(done) = self.completions.recv() => self.finish_delete(done),
                Some((source, signal)) = self.signals.next() => match signal {
                    Ok(event) => {
                        if let Some(event) = self.coordinator.handle_signal(source, event) {
                            self.emit(event);
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(
                            "Missed {} signals from {}",
                            missed,
                            self.coordinator.registry().name(source)
                        );
                    }
                },
            }
        }
        info!("Account manager stopped");
    }

    fn emit(&self, event: AccountEvent) {
        debug!("Emitting {:?}", event);
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    /// Serve one request. Breaks once shutdown has been acknowledged.
    fn handle_request(&mut self, request: Request) -> ControlFlow<()> {
        let coordinator = &mut self.coordinator;

        // Replies fail only if the caller went away; the work is done anyway.
        match request {
            Request::Accounts { reply } => {
                let _ = reply.send(coordinator.accounts());
            }
            Request::Owner { account, key, reply } => {
                let _ = reply.send(coordinator.owner_name(&account, &key).map(str::to_string));
            }
            Request::GetAttribute {
                account,
                attribute,
                expected,
                reply,
            } => {
                let _ = reply.send(coordinator.get_attribute(&account, &attribute, expected));
            }
            Request::GetParameter {
                account,
                parameter,
                expected,
                reply,
            } => {
                let _ = reply.send(coordinator.get_parameter(&account, &parameter, expected));
            }
            Request::ListParameters {
                account,
                typed,
                reply,
            } => {
                let names = if typed {
                    coordinator.list_typed_parameters(&account)
                } else {
                    coordinator.list_untyped_parameters(&account)
                };
                let _ = reply.send(names);
            }
            Request::Set {
                account,
                key,
                value,
                flags,
                reply,
            } => {
                let result = match &key {
                    EntryKey::Attribute(name) => {
                        coordinator.set_attribute(&account, name, value.as_ref(), flags)
                    }
                    EntryKey::Parameter(name) => {
                        coordinator.set_parameter(&account, name, value.as_ref(), flags)
                    }
                };
                if let Ok(SetResult::Changed) = result {
                    self.emit(AccountEvent::Altered { account, key });
                }
                let _ = reply.send(result);
            }
            Request::Create {
                manager,
                protocol,
                identification,
                reply,
            } => {
                let result = coordinator.create(&manager, &protocol, &identification);
                if let Ok(account) = &result {
                    self.emit(AccountEvent::Created {
                        account: account.clone(),
                    });
                }
                let _ = reply.send(result);
            }
            Request::Delete { account, reply } => match coordinator.begin_delete(&account) {
                Ok(storage) => {
                    let completions = self.completions_tx.clone();
                    tokio::spawn(async move {
                        let result = storage.delete(&account).await;
                        let _ = completions.send(DeleteCompletion {
                            account,
                            result,
                            reply,
                        });
                    });
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Request::Commit { account, reply } => {
                let _ = reply.send(coordinator.commit(account.as_deref()));
            }
            Request::StorageInfo { account, reply } => {
                let _ = reply.send(coordinator.storage_info(&account));
            }
            Request::Snapshot { account, reply } => {
                let _ = reply.send(coordinator.snapshot(account.as_deref()));
            }
            Request::Shutdown { reply } => {
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn finish_delete(&mut self, done: DeleteCompletion) {
        let DeleteCompletion {
            account,
            result,
            reply,
        } = done;

        let outcome = self.coordinator.finish_delete(&account, result);
        if let Ok(true) = outcome {
            self.emit(AccountEvent::Removed {
                account: account.clone(),
            });
        }
        let _ = reply.send(outcome.map(|_| ()));
    }
}

/// Cloneable handle to the running account manager.
///
/// Every call is queued to the coordinating task as soon as the returned
/// future is first polled. Dropping the future afterwards only discards the
/// answer: a delete that was started still completes and updates state.
#[derive(Clone)]
pub struct AccountManagerHandle {
    requests: mpsc::UnboundedSender<Request>,
    events: broadcast::Sender<AccountEvent>,
    identifier: Arc<dyn AccountIdentifier>,
}

impl AccountManagerHandle {
    async fn call<T>(&self, request: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, answer) = oneshot::channel();
        self.requests
            .send(request(reply))
            .map_err(|_| AccountError::ServiceStopped)?;
        answer.await.map_err(|_| AccountError::ServiceStopped)
    }

    /// Listen to account changes from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.events.subscribe()
    }

    pub async fn accounts(&self) -> Result<Vec<String>> {
        self.call(|reply| Request::Accounts { reply }).await
    }

    /// Name of the backend that owns the key.
    pub async fn owner(&self, account: &str, key: EntryKey) -> Result<Option<String>> {
        let account = account.to_string();
        self.call(|reply| Request::Owner {
            account,
            key,
            reply,
        })
        .await
    }

    pub async fn get_attribute(
        &self,
        account: &str,
        attribute: &str,
        expected: ValueType,
    ) -> Result<Option<Value>> {
        let (account, attribute) = (account.to_string(), attribute.to_string());
        self.call(|reply| Request::GetAttribute {
            account,
            attribute,
            expected,
            reply,
        })
        .await?
    }

    pub async fn get_parameter(
        &self,
        account: &str,
        parameter: &str,
        expected: Option<ValueType>,
    ) -> Result<Option<Value>> {
        let (account, parameter) = (account.to_string(), parameter.to_string());
        self.call(|reply| Request::GetParameter {
            account,
            parameter,
            expected,
            reply,
        })
        .await?
    }

    pub async fn list_typed_parameters(&self, account: &str) -> Result<Vec<String>> {
        let account = account.to_string();
        self.call(|reply| Request::ListParameters {
            account,
            typed: true,
            reply,
        })
        .await
    }

    pub async fn list_untyped_parameters(&self, account: &str) -> Result<Vec<String>> {
        let account = account.to_string();
        self.call(|reply| Request::ListParameters {
            account,
            typed: false,
            reply,
        })
        .await
    }

    pub async fn set_attribute(
        &self,
        account: &str,
        attribute: &str,
        value: Option<Value>,
        flags: EntryFlags,
    ) -> Result<SetResult> {
        self.set(account, EntryKey::attribute(attribute), value, flags)
            .await
    }

    pub async fn set_parameter(
        &self,
        account: &str,
        parameter: &str,
        value: Option<Value>,
        flags: EntryFlags,
    ) -> Result<SetResult> {
        self.set(account, EntryKey::parameter(parameter), value, flags)
            .await
    }

    async fn set(
        &self,
        account: &str,
        key: EntryKey,
        value: Option<Value>,
        flags: EntryFlags,
    ) -> Result<SetResult> {
        let account = account.to_string();
        self.call(|reply| Request::Set {
            account,
            key,
            value,
            flags,
            reply,
        })
        .await?
    }

    /// Create an account from an already normalized identification.
    pub async fn create(
        &self,
        manager: &str,
        protocol: &str,
        identification: &str,
    ) -> Result<String> {
        let (manager, protocol, identification) = (
            manager.to_string(),
            protocol.to_string(),
            identification.to_string(),
        );
        self.call(|reply| Request::Create {
            manager,
            protocol,
            identification,
            reply,
        })
        .await?
    }

    /// Identify, create, store every parameter, then commit.
    pub async fn create_account(
        &self,
        manager: &str,
        protocol: &str,
        parameters: BTreeMap<String, Value>,
    ) -> Result<String> {
        let identification = self
            .identifier
            .identify(manager, protocol, &parameters)
            .await?;
        let account = self.create(manager, protocol, &identification).await?;

        for (name, value) in parameters {
            self.set_parameter(&account, &name, Some(value), EntryFlags::NONE)
                .await?;
        }

        let report = self.commit(Some(&account)).await?;
        if !report.is_accepted() {
            warn!("No storage backend accepted to commit {}", account);
        }
        Ok(account)
    }

    pub async fn delete(&self, account: &str) -> Result<()> {
        let account = account.to_string();
        self.call(|reply| Request::Delete { account, reply })
            .await?
    }

    pub async fn commit(&self, account: Option<&str>) -> Result<CommitReport> {
        let account = account.map(str::to_string);
        self.call(|reply| Request::Commit { account, reply })
            .await?
    }

    pub async fn storage_info(&self, account: &str) -> Result<StorageInfo> {
        let account = account.to_string();
        self.call(|reply| Request::StorageInfo { account, reply })
            .await?
    }

    /// Merged view of every account, or of one.
    pub async fn snapshot(&self, account: Option<&str>) -> Result<Vec<AccountView>> {
        let account = account.map(str::to_string);
        self.call(|reply| Request::Snapshot { account, reply })
            .await
    }

    /// Stop the coordinating task. Other handles get `ServiceStopped` afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(|reply| Request::Shutdown { reply }).await
    }
}
