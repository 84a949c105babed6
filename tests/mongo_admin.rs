use mongo_provisioner::{MongoAdmin, ProvisionError};

#[tokio::test]
async fn malformed_uri_is_a_connection_error() {
    let err = MongoAdmin::connect("not-a-uri").await.unwrap_err();
    assert!(matches!(err, ProvisionError::Connection(_)), "got {:?}", err);
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    let err = MongoAdmin::connect("mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200")
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::Connection(_)), "got {:?}", err);
}
