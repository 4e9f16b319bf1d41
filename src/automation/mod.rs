//! Rule-driven message automation: template rendering, idempotent
//! birthday-month scheduling, and bounded-retry delivery.

pub mod delivery;
pub mod scheduler;
pub mod template;

pub use delivery::{DeliveryQueue, DeliveryReceipt, DeliveryReport, MessageSender, SendError};
pub use scheduler::AutomationScheduler;
