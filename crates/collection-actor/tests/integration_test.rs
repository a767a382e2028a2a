use collection_actor::{CacheError, CollectionActor, CollectionEntity};

// --- Test Entity ---

#[derive(Clone, Debug, PartialEq)]
struct VirtualServer {
    name: String,
    uuid: String,
    port: u16,
}

impl CollectionEntity for VirtualServer {
    const KIND: &'static str = "virtual-server";

    fn name(&self) -> &str {
        &self.name
    }

    fn source_uuid(&self) -> &str {
        &self.uuid
    }
}

fn vs(name: &str, uuid: &str, port: u16) -> VirtualServer {
    VirtualServer {
        name: name.into(),
        uuid: uuid.into(),
        port,
    }
}

// --- Test ---

#[tokio::test]
async fn test_collection_full_lifecycle() {
    let (actor, client) = CollectionActor::new(10);
    tokio::spawn(actor.run());

    // 1. Populate from a full fetch
    let size = client
        .populate(vec![vs("shop", "vs-1", 443), vs("api", "vs-2", 80)])
        .await
        .unwrap();
    assert_eq!(size, 2);

    // 2. Upsert the outcome of a modify
    client.upsert(vs("shop", "vs-1", 8443)).await.unwrap();
    let shop = client.by_name("shop").await.unwrap().unwrap();
    assert_eq!(shop.port, 8443);

    // 3. Remove after a delete
    let removed = client.remove("vs-2").await.unwrap();
    assert_eq!(removed.map(|r| r.name), Some("api".to_string()));
    assert!(client.by_name("api").await.unwrap().is_none());

    // 4. Removing an unknown uuid is not an error
    assert!(client.remove("vs-404").await.unwrap().is_none());

    let snapshot = client.snapshot().await.unwrap();
    assert_eq!(snapshot, vec![vs("shop", "vs-1", 8443)]);
}

#[tokio::test]
async fn test_concurrent_clients_see_consistent_indices() {
    let (actor, client) = CollectionActor::new(4);
    tokio::spawn(actor.run());

    let mut handles = Vec::new();
    for i in 0..20u16 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client
                .upsert(vs(&format!("vs-{i}"), &format!("uuid-{i}"), 1000 + i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for i in 0..20u16 {
        let by_name = client.by_name(&format!("vs-{i}")).await.unwrap().unwrap();
        let by_uuid = client.by_uuid(&format!("uuid-{i}")).await.unwrap().unwrap();
        assert_eq!(by_name, by_uuid);
    }
}

#[tokio::test]
async fn test_client_reports_closed_actor() {
    let (actor, client) = CollectionActor::<VirtualServer>::new(1);
    drop(actor);

    let err = client.snapshot().await.unwrap_err();
    assert_eq!(err, CacheError::ActorClosed);
}
