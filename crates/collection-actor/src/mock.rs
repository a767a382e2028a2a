//! # Mock Collection
//!
//! Utilities for testing code that talks to a `CollectionClient` without running a real
//! `CollectionActor`.
//!
//! Two styles are available:
//!
//! - [`MockCollection`]: queue expectations up front with a fluent builder, hand the client
//!   to the code under test, then call [`MockCollection::verify`].
//! - [`create_mock_client`] plus the `expect_*` helpers: receive raw requests on a channel
//!   and answer them by hand, useful when the test needs to inspect the payload.
//!
//! ```rust
//! use collection_actor::mock::MockCollection;
//! use collection_actor::CollectionEntity;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Pool { name: String, uuid: String }
//! impl CollectionEntity for Pool {
//!     const KIND: &'static str = "pool";
//!     fn name(&self) -> &str { &self.name }
//!     fn source_uuid(&self) -> &str { &self.uuid }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockCollection::<Pool>::new();
//!     mock.expect_by_name("web").return_ok(Some(Pool { name: "web".into(), uuid: "p-1".into() }));
//!
//!     let client = mock.client();
//!     let pool = client.by_name("web").await.unwrap().unwrap();
//!     assert_eq!(pool.uuid, "p-1");
//!     mock.verify();
//! }
//! ```

use crate::client::CollectionClient;
use crate::entity::CollectionEntity;
use crate::error::CacheError;
use crate::message::{CollectionRequest, Response};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// An expected request and the canned answer for it.
enum Expectation<T: CollectionEntity> {
    Populate {
        response: Result<usize, CacheError>,
    },
    Upsert {
        response: Result<(), CacheError>,
    },
    Remove {
        uuid: String,
        response: Result<Option<T>, CacheError>,
    },
    ByUuid {
        uuid: String,
        response: Result<Option<T>, CacheError>,
    },
    ByName {
        name: String,
        response: Result<Option<T>, CacheError>,
    },
    Snapshot {
        response: Result<Vec<T>, CacheError>,
    },
}

type Queue<T> = Arc<Mutex<VecDeque<Expectation<T>>>>;

/// A mock collection with expectation tracking.
///
/// Requests are answered strictly in the order the expectations were queued. A request
/// that does not match the next expectation (wrong kind or wrong key) panics inside the
/// mock task, which surfaces as `ActorDropped` at the caller.
pub struct MockCollection<T: CollectionEntity> {
    client: CollectionClient<T>,
    expectations: Queue<T>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<T: CollectionEntity> MockCollection<T> {
    /// Creates a new mock with no expectations.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<CollectionRequest<T>>(100);
        let expectations: Queue<T> = Arc::new(Mutex::new(VecDeque::new()));
        let queue = expectations.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let next = queue.lock().unwrap().pop_front();
                match (request, next) {
                    (
                        CollectionRequest::Populate { respond_to, .. },
                        Some(Expectation::Populate { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        CollectionRequest::Upsert { respond_to, .. },
                        Some(Expectation::Upsert { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        CollectionRequest::Remove { uuid, respond_to },
                        Some(Expectation::Remove {
                            uuid: expected,
                            response,
                        }),
                    ) => {
                        assert_eq!(uuid, expected, "Remove called with unexpected uuid");
                        let _ = respond_to.send(response);
                    }
                    (
                        CollectionRequest::ByUuid { uuid, respond_to },
                        Some(Expectation::ByUuid {
                            uuid: expected,
                            response,
                        }),
                    ) => {
                        assert_eq!(uuid, expected, "ByUuid called with unexpected uuid");
                        let _ = respond_to.send(response);
                    }
                    (
                        CollectionRequest::ByName { name, respond_to },
                        Some(Expectation::ByName {
                            name: expected,
                            response,
                        }),
                    ) => {
                        assert_eq!(name, expected, "ByName called with unexpected name");
                        let _ = respond_to.send(response);
                    }
                    (
                        CollectionRequest::Snapshot { respond_to },
                        Some(Expectation::Snapshot { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    _ => panic!("Unexpected request or expectation mismatch"),
                }
            }
        });

        Self {
            client: CollectionClient::new(sender),
            expectations,
            _handle: handle,
        }
    }

    /// Returns a client wired to this mock.
    pub fn client(&self) -> CollectionClient<T> {
        self.client.clone()
    }

    pub fn expect_populate(&mut self) -> ExpectationBuilder<T, usize> {
        self.builder(|response| Expectation::Populate { response })
    }

    pub fn expect_upsert(&mut self) -> ExpectationBuilder<T, ()> {
        self.builder(|response| Expectation::Upsert { response })
    }

    pub fn expect_remove(&mut self, uuid: impl Into<String>) -> ExpectationBuilder<T, Option<T>> {
        let uuid = uuid.into();
        self.builder(move |response| Expectation::Remove { uuid, response })
    }

    pub fn expect_by_uuid(&mut self, uuid: impl Into<String>) -> ExpectationBuilder<T, Option<T>> {
        let uuid = uuid.into();
        self.builder(move |response| Expectation::ByUuid { uuid, response })
    }

    pub fn expect_by_name(&mut self, name: impl Into<String>) -> ExpectationBuilder<T, Option<T>> {
        let name = name.into();
        self.builder(move |response| Expectation::ByName { name, response })
    }

    pub fn expect_snapshot(&mut self) -> ExpectationBuilder<T, Vec<T>> {
        self.builder(|response| Expectation::Snapshot { response })
    }

    /// Panics if any queued expectation was not consumed.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().unwrap().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }

    fn builder<R>(
        &self,
        make: impl FnOnce(Result<R, CacheError>) -> Expectation<T> + Send + 'static,
    ) -> ExpectationBuilder<T, R> {
        ExpectationBuilder {
            make: Box::new(make),
            expectations: self.expectations.clone(),
        }
    }
}

impl<T: CollectionEntity> Default for MockCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder that completes one expectation with its canned answer.
pub struct ExpectationBuilder<T: CollectionEntity, R> {
    make: Box<dyn FnOnce(Result<R, CacheError>) -> Expectation<T> + Send>,
    expectations: Queue<T>,
}

impl<T: CollectionEntity, R> ExpectationBuilder<T, R> {
    pub fn return_ok(self, value: R) {
        let expectation = (self.make)(Ok(value));
        self.expectations.lock().unwrap().push_back(expectation);
    }

    pub fn return_err(self, error: CacheError) {
        let expectation = (self.make)(Err(error));
        self.expectations.lock().unwrap().push_back(expectation);
    }
}

// =============================================================================
// RAW CHANNEL HELPERS
// =============================================================================

/// Creates a client and the receiver its requests arrive on.
pub fn create_mock_client<T: CollectionEntity>(
    buffer_size: usize,
) -> (CollectionClient<T>, mpsc::Receiver<CollectionRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (CollectionClient::new(sender), receiver)
}

/// Returns the next request if it is an `Upsert`.
pub async fn expect_upsert<T: CollectionEntity>(
    receiver: &mut mpsc::Receiver<CollectionRequest<T>>,
) -> Option<(T, Response<()>)> {
    match receiver.recv().await {
        Some(CollectionRequest::Upsert { record, respond_to }) => Some((record, respond_to)),
        _ => None,
    }
}

/// Returns the next request if it is a `Remove`.
pub async fn expect_remove<T: CollectionEntity>(
    receiver: &mut mpsc::Receiver<CollectionRequest<T>>,
) -> Option<(String, Response<Option<T>>)> {
    match receiver.recv().await {
        Some(CollectionRequest::Remove { uuid, respond_to }) => Some((uuid, respond_to)),
        _ => None,
    }
}

/// Returns the next request if it is a `Snapshot`.
pub async fn expect_snapshot<T: CollectionEntity>(
    receiver: &mut mpsc::Receiver<CollectionRequest<T>>,
) -> Option<Response<Vec<T>>> {
    match receiver.recv().await {
        Some(CollectionRequest::Snapshot { respond_to }) => Some(respond_to),
        _ => None,
    }
}
