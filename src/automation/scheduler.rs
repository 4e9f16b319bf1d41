use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::automation::template;
use crate::db::automation_rule::{AutomationRule, TriggerType};
use crate::db::contact::Contact;
use crate::db::scheduled_message::ScheduledMessage;
use crate::store::{LocalStore, StoreError};

/// Evaluates active automation rules against contact data and inserts
/// `pending` [`ScheduledMessage`] rows.
///
/// Evaluation is safe to run on every start and every tick: the only
/// dedup mechanism is the year-scoped uniqueness check against existing
/// rows for `(rule, contact, year)`, so repeated runs converge instead
/// of stacking messages.
pub struct AutomationScheduler {
    store: Arc<LocalStore>,
}

impl AutomationScheduler {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub async fn process_all_rules(&self) -> Result<usize, StoreError> {
        self.process_all_rules_at(Utc::now()).await
    }

    /// One evaluation pass at the given instant. Returns the number of
    /// messages scheduled.
    pub async fn process_all_rules_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let rules = self.store.get_all::<AutomationRule>().await?;
        let active: Vec<_> = rules.into_iter().filter(|r| r.is_active).collect();
        if active.is_empty() {
            return Ok(0);
        }

        let contacts = self.store.get_all::<Contact>().await?;
        let existing = self.store.get_all::<ScheduledMessage>().await?;

        let mut scheduled = 0;
        for rule in &active {
            for contact in &contacts {
                if !Self::qualifies(rule, contact, now) {
                    continue;
                }
                let Some(phone) = contact.phone.clone() else {
                    debug!("skipping contact {} for rule {}: no phone", contact.id, rule.id);
                    continue;
                };

                // The send instant decides which calendar year the row
                // lands in (a late-December rollover crosses into
                // January), so it is computed before the dedup check.
                let scheduled_for =
                    compute_scheduled_for(now, rule.send_time, rule.days_offset);
                if Self::already_scheduled(
                    &existing,
                    rule.id,
                    contact.id,
                    &[now.year(), scheduled_for.year()],
                ) {
                    continue;
                }
                let message = ScheduledMessage {
                    automation_rule_id: Some(rule.id),
                    contact_id: contact.id,
                    phone,
                    message_body: template::render(&rule.message_body, contact, now.year()),
                    scheduled_for: scheduled_for.timestamp() as f64,
                    ..ScheduledMessage::default()
                };
                self.store.save(message).await?;
                scheduled += 1;
            }
        }

        if scheduled > 0 {
            info!("rule evaluation scheduled {scheduled} messages");
        }
        Ok(scheduled)
    }

    /// User-initiated cancellation: `pending -> cancelled`. Any other
    /// status (or a missing id) is a no-op returning false.
    pub async fn cancel_scheduled_message(&self, id: Uuid) -> Result<bool, StoreError> {
        let Some(mut message) = self.store.get::<ScheduledMessage>(id).await? else {
            return Ok(false);
        };
        if !message.cancel() {
            return Ok(false);
        }
        self.store.save(message).await?;
        Ok(true)
    }

    fn qualifies(rule: &AutomationRule, contact: &Contact, now: DateTime<Utc>) -> bool {
        if contact.is_blocked {
            debug!("skipping blocked contact {}", contact.id);
            return false;
        }
        match rule.trigger {
            TriggerType::BirthdayMonth => contact
                .birthday
                .as_ref()
                .is_some_and(|b| b.month == now.month()),
        }
    }

    /// Any existing row for `(rule, contact)` in one of `years` blocks a
    /// new one, regardless of status: a cancelled or failed birthday
    /// greeting must not be silently re-created by the next evaluation
    /// pass. Callers pass both the evaluation year and the candidate's
    /// scheduled year, which differ when a late-December run rolls the
    /// send instant into January.
    fn already_scheduled(
        existing: &[ScheduledMessage],
        rule_id: Uuid,
        contact_id: Uuid,
        years: &[i32],
    ) -> bool {
        existing.iter().any(|m| {
            m.automation_rule_id == Some(rule_id)
                && m.contact_id == contact_id
                && years.contains(&m.scheduled_year())
        })
    }
}

/// Target instant for a rule firing this month: the first of the month at
/// `send_time`, shifted by `days_offset` days. When that instant already
/// passed, the message goes out today at `send_time` if that is still
/// ahead, otherwise tomorrow at `send_time`.
fn compute_scheduled_for(
    now: DateTime<Utc>,
    send_time: NaiveTime,
    days_offset: i64,
) -> DateTime<Utc> {
    let today = now.date_naive();
    let first_of_month = today.with_day(1).unwrap_or(today);
    let base = (first_of_month.and_time(send_time) + Duration::days(days_offset)).and_utc();
    if base > now {
        return base;
    }
    let today_at = today.and_time(send_time).and_utc();
    if today_at > now {
        today_at
    } else {
        today_at + Duration::days(1)
    }
}
