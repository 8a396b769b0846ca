mod common;

use chrono::{Duration, Utc};
use common::{cleanup, seed_connection, set_webhook, spawn_db};
use crmsync::db::{ActivityCreate, ConnectionPatch, ContactCreate, LeadCreate, ProviderKind};

#[tokio::test]
async fn connection_lifecycle_roundtrip() {
    let (db, path) = spawn_db("db-connections").await;

    assert!(db.list_active_connections(None).await.unwrap().is_empty());

    let created = seed_connection(&db, "user-1", ProviderKind::Gmail, "rep@acme.io", "at-1").await;
    assert!(created.id > 0);
    assert!(created.is_active);
    assert_eq!(created.provider, ProviderKind::Gmail);
    assert!(created.webhook_expiry.is_none());

    // Same (user, provider, mailbox) updates the row in place.
    let again = seed_connection(&db, "user-1", ProviderKind::Gmail, "rep@acme.io", "at-2").await;
    assert_eq!(again.id, created.id);
    assert_eq!(again.access_token, "at-2");

    let expiry = Utc::now() + Duration::days(3);
    set_webhook(&db, created.id, Some("sub-9"), expiry).await;

    let by_mailbox = db
        .list_active_connections_by_mailbox(ProviderKind::Gmail, "rep@acme.io")
        .await
        .unwrap();
    assert_eq!(by_mailbox.len(), 1);
    assert_eq!(by_mailbox[0].id, created.id);
    assert_eq!(by_mailbox[0].webhook_subscription_id.as_deref(), Some("sub-9"));
    assert!(
        db.list_active_connections_by_mailbox(ProviderKind::Outlook, "rep@acme.io")
            .await
            .unwrap()
            .is_empty()
    );

    let by_sub = db
        .find_active_connection_by_subscription("sub-9")
        .await
        .unwrap()
        .expect("connection by subscription");
    assert_eq!(by_sub.id, created.id);

    db.patch_connection(created.id, ConnectionPatch::synced_at(Utc::now()))
        .await
        .unwrap();
    let fetched = db.get_connection(created.id).await.unwrap().unwrap();
    assert!(fetched.last_sync_at.is_some());
    // Untouched columns survive a partial patch.
    assert_eq!(fetched.webhook_subscription_id.as_deref(), Some("sub-9"));

    let deactivated = db.deactivate_user_connections("user-1").await.unwrap();
    assert_eq!(deactivated, 1);
    assert!(db.list_user_connections("user-1").await.unwrap().is_empty());
    assert!(
        db.find_active_connection_by_subscription("sub-9")
            .await
            .unwrap()
            .is_none()
    );

    assert!(db.delete_connection(created.id).await.unwrap());
    assert!(!db.delete_connection(created.id).await.unwrap());
    assert!(db.get_connection(created.id).await.unwrap().is_none());

    let err = db
        .patch_connection(created.id, ConnectionPatch::synced_at(Utc::now()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    cleanup(&path);
}

#[tokio::test]
async fn shared_mailbox_lists_every_active_connection() {
    let (db, path) = spawn_db("db-shared-mailbox").await;

    let first = seed_connection(&db, "user-1", ProviderKind::Gmail, "team@acme.io", "at-1").await;
    let second = seed_connection(&db, "user-2", ProviderKind::Gmail, "team@acme.io", "at-2").await;
    assert_ne!(first.id, second.id);

    let ids: Vec<i64> = db
        .list_active_connections_by_mailbox(ProviderKind::Gmail, "team@acme.io")
        .await
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);

    db.deactivate_user_connections("user-1").await.unwrap();
    let remaining = db
        .list_active_connections_by_mailbox(ProviderKind::Gmail, "team@acme.io")
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, second.id);

    cleanup(&path);
}

#[tokio::test]
async fn stopped_actor_reports_database_error() {
    let (db, path) = spawn_db("db-stopped").await;
    seed_connection(&db, "user-1", ProviderKind::Gmail, "rep@acme.io", "at").await;

    db.stop().await.unwrap();

    let err = db.list_user_connections("user-1").await.unwrap_err();
    assert_eq!(err.code(), "DATABASE_ERROR");
    assert!(err.is_storage_unavailable());

    cleanup(&path);
}

#[tokio::test]
async fn contacts_and_leads_match_exact_address() {
    let (db, path) = spawn_db("db-crm").await;

    let contact_id = db
        .create_contact(ContactCreate {
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            email: Some("Ada@Example.com".to_string()),
            account_id: Some(7),
        })
        .await
        .unwrap();
    let lead_id = db
        .create_lead(LeadCreate {
            first_name: Some("Grace".to_string()),
            last_name: None,
            email: Some("grace@navy.mil".to_string()),
            company: Some("Navy".to_string()),
        })
        .await
        .unwrap();

    let contact = db.find_contact_by_email("Ada@Example.com").await.unwrap().unwrap();
    assert_eq!(contact.id, contact_id);
    assert_eq!(contact.account_id, Some(7));

    let lead = db.find_lead_by_email("grace@navy.mil").await.unwrap().unwrap();
    assert_eq!(lead.id, lead_id);

    assert!(db.find_contact_by_email("nobody@x.io").await.unwrap().is_none());
    assert!(db.find_contact_by_email("ada@example.com").await.unwrap().is_none());

    cleanup(&path);
}

#[tokio::test]
async fn activity_insert_is_unique_per_provider_message() {
    let (db, path) = spawn_db("db-activities").await;

    let create = ActivityCreate {
        activity_type: "Email".to_string(),
        subject: "Hello".to_string(),
        activity_date: Utc::now(),
        user_id: "user-1".to_string(),
        email_message_id: Some("m-1".to_string()),
        email_provider: Some(ProviderKind::Gmail),
        ..Default::default()
    };

    let first = db.insert_activity(create.clone()).await.unwrap();
    assert!(first.is_some());
    let second = db.insert_activity(create.clone()).await.unwrap();
    assert!(second.is_none(), "duplicate insert must be a no-op");

    // Same message id from the other provider is a different activity.
    let other = db
        .insert_activity(ActivityCreate {
            email_provider: Some(ProviderKind::Outlook),
            ..create
        })
        .await
        .unwrap();
    assert!(other.is_some());

    assert_eq!(
        db.find_email_activity(ProviderKind::Gmail, "m-1").await.unwrap(),
        first
    );
    assert_eq!(db.list_user_activities("user-1").await.unwrap().len(), 2);

    cleanup(&path);
}

#[tokio::test]
async fn processed_events_dedup_and_purge() {
    let (db, path) = spawn_db("db-processed").await;

    assert!(!db.processed_event_exists("gmail_webhook", "k1").await.unwrap());
    assert!(
        db.insert_processed_event("gmail_webhook", "k1", None)
            .await
            .unwrap()
    );
    assert!(
        !db.insert_processed_event("gmail_webhook", "k1", None)
            .await
            .unwrap()
    );
    assert!(db.processed_event_exists("gmail_webhook", "k1").await.unwrap());
    // Keys are scoped by event type.
    assert!(!db.processed_event_exists("outlook_webhook", "k1").await.unwrap());

    let purged_none = db
        .purge_processed_events(Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert_eq!(purged_none, 0);

    let purged = db
        .purge_processed_events(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);
    assert!(!db.processed_event_exists("gmail_webhook", "k1").await.unwrap());

    cleanup(&path);
}
