//! Offline-first contact, campaign and automation engine.
//!
//! Local writes land in a dual-backend [`store::LocalStore`] and are
//! queued for the remote authoritative store; [`sync::SyncEngine`]
//! reconciles both sides with timestamp last-write-wins pulls followed
//! by a push of the offline queue. Independently,
//! [`automation::AutomationScheduler`] turns active rules into scheduled
//! messages and [`automation::DeliveryQueue`] delivers them with bounded
//! retries.

pub mod automation;
pub mod config;
pub mod db;
pub mod store;
pub mod sync;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use automation::{AutomationScheduler, DeliveryQueue, MessageSender};
use config::Config;
use db::automation_rule::AutomationRule;
use db::campaign::Campaign;
use db::contact::Contact;
use db::pending_mutation::MutationOp;
use store::{LocalStore, Record, StoreError};
use sync::{Connectivity, MutationQueue, RemoteStore, SyncEngine};

/// All long-lived service instances, built once at process start and
/// handed to whoever needs them. The user-facing write path lives here:
/// each call persists locally and enqueues exactly one mutation for the
/// next sync cycle.
pub struct Services {
    pub store: Arc<LocalStore>,
    pub queue: MutationQueue,
    pub connectivity: Connectivity,
    pub sync_engine: Arc<SyncEngine>,
    pub scheduler: Arc<AutomationScheduler>,
    pub delivery: Arc<DeliveryQueue>,
    config: Config,
}

impl Services {
    pub async fn init(
        config: Config,
        remote: Arc<dyn RemoteStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Result<Self, StoreError> {
        let store = Arc::new(LocalStore::open(&config).await?);
        Ok(Self::assemble(store, config, remote, sender))
    }

    fn assemble(
        store: Arc<LocalStore>,
        config: Config,
        remote: Arc<dyn RemoteStore>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        let queue = MutationQueue::new(Arc::clone(&store));
        let connectivity = Connectivity::new(true);
        let sync_engine = Arc::new(SyncEngine::new(
            Arc::clone(&store),
            queue.clone(),
            remote,
            connectivity.clone(),
        ));
        let scheduler = Arc::new(AutomationScheduler::new(Arc::clone(&store)));
        let delivery = Arc::new(DeliveryQueue::new(
            Arc::clone(&store),
            sender,
            config.max_send_attempts,
        ));
        Self {
            store,
            queue,
            connectivity,
            sync_engine,
            scheduler,
            delivery,
            config,
        }
    }

    /// Starts the periodic sync and automation loops. Both stop when
    /// `shutdown` flips; each cycle commits per unit of work, so shutdown
    /// mid-cycle loses at most progress, never correctness.
    pub fn spawn_background(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            Arc::clone(&self.sync_engine).spawn(self.config.sync_interval(), shutdown.clone()),
            Arc::clone(&self.delivery).spawn(
                Arc::clone(&self.scheduler),
                self.config.delivery_poll(),
                shutdown,
            ),
        ]
    }

    pub async fn save_contact(&self, contact: Contact) -> Result<Contact, StoreError> {
        self.save_and_enqueue(contact).await
    }

    pub async fn delete_contact(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete_and_enqueue::<Contact>(id).await
    }

    pub async fn save_campaign(&self, campaign: Campaign) -> Result<Campaign, StoreError> {
        self.save_and_enqueue(campaign).await
    }

    pub async fn save_automation_rule(
        &self,
        rule: AutomationRule,
    ) -> Result<AutomationRule, StoreError> {
        self.save_and_enqueue(rule).await
    }

    pub async fn delete_automation_rule(&self, id: Uuid) -> Result<(), StoreError> {
        self.delete_and_enqueue::<AutomationRule>(id).await
    }

    /// Scheduled messages are local-only work items; cancellation does not
    /// enqueue a mutation.
    pub async fn cancel_scheduled_message(&self, id: Uuid) -> Result<bool, StoreError> {
        self.scheduler.cancel_scheduled_message(id).await
    }

    /// Starting point for a user-created rule, carrying the configured
    /// default send time. Callers fill in name and body before saving.
    pub fn new_automation_rule(&self) -> AutomationRule {
        AutomationRule {
            send_time: self.config.default_send_time(),
            ..AutomationRule::default()
        }
    }

    async fn save_and_enqueue<T: Record>(&self, entity: T) -> Result<T, StoreError> {
        let operation = if self.store.get::<T>(entity.id()).await?.is_some() {
            MutationOp::Update
        } else {
            MutationOp::Insert
        };
        let saved = self.store.save(entity).await?;
        self.queue.enqueue_record(operation, &saved).await?;
        Ok(saved)
    }

    async fn delete_and_enqueue<T: Record>(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete::<T>(id).await?;
        self.queue.enqueue_delete(T::TABLE, id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::delivery::testing::ScriptedSender;
    use crate::db::contact::Birthday;
    use crate::db::scheduled_message::{MessageStatus, ScheduledMessage};
    use crate::sync::remote::testing::InMemoryRemote;
    use crate::sync::SyncOutcome;
    use chrono::{Datelike, TimeZone, Utc};

    struct Harness {
        services: Services,
        remote: Arc<InMemoryRemote>,
        sender: Arc<ScriptedSender>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(
            LocalStore::open_sqlite_in_memory()
                .await
                .expect("open store"),
        );
        let remote = Arc::new(InMemoryRemote::default());
        let sender = Arc::new(ScriptedSender::default());
        let services = Services::assemble(
            store,
            Config::default(),
            Arc::clone(&remote) as Arc<dyn RemoteStore>,
            Arc::clone(&sender) as Arc<dyn MessageSender>,
        );
        Harness {
            services,
            remote,
            sender,
        }
    }

    #[tokio::test]
    async fn test_offline_writes_reach_remote_after_reconnect() {
        let h = harness().await;
        h.services.connectivity.set_online(false);

        let contact = h
            .services
            .save_contact(Contact {
                name: "Offline Olga".into(),
                phone: Some("+15550009999".into()),
                ..Contact::default()
            })
            .await
            .expect("save");
        assert_eq!(h.services.queue.len().await.expect("len"), 1);

        let report = h.services.sync_engine.sync_all().await;
        assert_eq!(report.outcome, SyncOutcome::Offline);
        assert!(!h.remote.contains("contact", contact.id));

        h.services.connectivity.set_online(true);
        let report = h.services.sync_engine.sync_all().await;
        assert_eq!(report.outcome, SyncOutcome::Completed);
        assert_eq!(report.pushed, 1);
        assert!(h.remote.contains("contact", contact.id));
        assert_eq!(h.services.queue.len().await.expect("len"), 0);
    }

    #[tokio::test]
    async fn test_write_path_enqueues_insert_then_update() {
        let h = harness().await;
        let contact = h
            .services
            .save_contact(Contact {
                name: "Twice Written".into(),
                ..Contact::default()
            })
            .await
            .expect("first save");
        h.services
            .save_contact(contact.clone())
            .await
            .expect("second save");

        let entries = h.services.queue.drain().await.expect("drain");
        assert_eq!(
            entries.iter().map(|m| m.operation).collect::<Vec<_>>(),
            vec![MutationOp::Insert, MutationOp::Update]
        );
        assert!(entries.iter().all(|m| m.table_name == "contact"));
    }

    #[tokio::test]
    async fn test_delete_contact_propagates_to_remote() {
        let h = harness().await;
        let contact = h
            .services
            .save_contact(Contact {
                name: "Soon Gone".into(),
                ..Contact::default()
            })
            .await
            .expect("save");
        h.services.sync_engine.sync_all().await;
        assert!(h.remote.contains("contact", contact.id));

        h.services.delete_contact(contact.id).await.expect("delete");
        h.services.sync_engine.sync_all().await;
        assert!(!h.remote.contains("contact", contact.id));
        assert!(h
            .services
            .store
            .get::<Contact>(contact.id)
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn test_birthday_rule_end_to_end() {
        let h = harness().await;
        let now = Utc.with_ymd_and_hms(2026, 3, 12, 8, 0, 0).unwrap();

        h.services
            .save_automation_rule(AutomationRule {
                name: "Birthday".into(),
                message_body: "Happy birthday, {firstName}! See you in {year}.".into(),
                ..AutomationRule::default()
            })
            .await
            .expect("save rule");
        h.services
            .save_contact(Contact {
                name: "Nina Petrova".into(),
                phone: Some("+15550004444".into()),
                birthday: Some(Birthday {
                    month: now.month(),
                    day: 3,
                    year: None,
                }),
                ..Contact::default()
            })
            .await
            .expect("save contact");

        let scheduled = h
            .services
            .scheduler
            .process_all_rules_at(now)
            .await
            .expect("evaluate");
        assert_eq!(scheduled, 1);

        // Due at 09:00 the same day; a cycle after that instant delivers it.
        let after_send_time = (now.timestamp() + 2 * 3600) as f64;
        let report = h
            .services
            .delivery
            .process_queue_at(after_send_time)
            .await
            .expect("deliver");
        assert_eq!(report.sent, 1);

        let sent = h.sender.sent.lock().expect("sender lock").clone();
        assert_eq!(
            sent,
            vec![(
                "+15550004444".to_string(),
                "Happy birthday, Nina! See you in 2026.".to_string()
            )]
        );

        let messages = h
            .services
            .store
            .get_all::<ScheduledMessage>()
            .await
            .expect("list");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_new_rules_carry_configured_send_time() {
        let store = Arc::new(
            LocalStore::open_sqlite_in_memory()
                .await
                .expect("open store"),
        );
        let config = Config {
            default_send_time: "17:30".into(),
            ..Config::default()
        };
        let services = Services::assemble(
            store,
            config,
            Arc::new(InMemoryRemote::default()) as Arc<dyn RemoteStore>,
            Arc::new(ScriptedSender::default()) as Arc<dyn MessageSender>,
        );

        let rule = services.new_automation_rule();
        assert_eq!(
            rule.send_time,
            chrono::NaiveTime::from_hms_opt(17, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_remote_rows_visible_after_pull() {
        let h = harness().await;
        let remote_contact = Contact {
            name: "Pulled Pavel".into(),
            updated_at: 777.0,
            ..Contact::default()
        };
        h.remote.seed(
            "contact",
            serde_json::to_value(&remote_contact).expect("serialize"),
        );

        let report = h.services.sync_engine.sync_all().await;
        assert_eq!(report.pulled, 1);
        let local = h
            .services
            .store
            .get::<Contact>(remote_contact.id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(local.name, "Pulled Pavel");
        assert_eq!(local.updated_at, 777.0);
    }
}
