use crate::{
    entities::{
        order::{self, PaymentStatus},
        Order,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::OrderNotifier,
};
use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a requested payment-status overwrite relates to the defined
/// transitions. Every kind is still applied (the provider's latest event
/// wins) but they are logged differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// A defined transition (pending→paid, pending→failed, paid→refunded, …)
    Normal,
    /// Same status again: a duplicate delivery, safe no-op
    Redundant,
    /// paid→failed: not a defined transition, worth an operator's attention
    Suspicious,
}

pub fn classify_transition(from: PaymentStatus, to: PaymentStatus) -> TransitionKind {
    if from == to {
        TransitionKind::Redundant
    } else if from == PaymentStatus::Paid && to == PaymentStatus::Failed {
        TransitionKind::Suspicious
    } else {
        TransitionKind::Normal
    }
}

/// Applies verified payment-provider events to persisted orders.
///
/// The write is a status overwrite keyed by the stored payment-intent id.
/// Re-applying the same (intent, status) pair is a no-op by construction, so
/// duplicate deliveries need no bookkeeping of their own.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    notifier: Option<Arc<OrderNotifier>>,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        notifier: Option<Arc<OrderNotifier>>,
    ) -> Self {
        Self {
            db,
            event_sender,
            notifier,
        }
    }

    /// Applies a payment event to the order holding this intent reference.
    ///
    /// Returns the updated order, or `None` when no order carries the intent
    /// id, an expected case (intents created before checkout, test events),
    /// logged and dropped rather than erroring, so the webhook can still be
    /// acknowledged.
    #[instrument(skip(self))]
    pub async fn apply_payment_event(
        &self,
        payment_intent_id: &str,
        new_status: PaymentStatus,
    ) -> Result<Option<order::Model>, ServiceError> {
        let Some(before) = Order::find()
            .filter(order::Column::PaymentIntentId.eq(payment_intent_id))
            .one(&*self.db)
            .await?
        else {
            info!(
                payment_intent_id = %payment_intent_id,
                status = %new_status.as_str(),
                "Payment event matches no order, dropping"
            );
            return Ok(None);
        };

        match classify_transition(before.payment_status, new_status) {
            TransitionKind::Redundant => {
                debug!(
                    order_number = %before.order_number,
                    status = %new_status.as_str(),
                    "Duplicate payment event, no-op overwrite"
                );
            }
            TransitionKind::Suspicious => {
                warn!(
                    order_number = %before.order_number,
                    from = %before.payment_status.as_str(),
                    to = %new_status.as_str(),
                    "Suspicious payment transition, applying latest event anyway"
                );
            }
            TransitionKind::Normal => {
                info!(
                    order_number = %before.order_number,
                    from = %before.payment_status.as_str(),
                    to = %new_status.as_str(),
                    "Applying payment transition"
                );
            }
        }

        Order::update_many()
            .col_expr(order::Column::PaymentStatus, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::PaymentIntentId.eq(payment_intent_id))
            .exec(&*self.db)
            .await?;

        let after = Order::find_by_id(before.id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Order {} vanished during status update",
                    before.id
                ))
            })?;

        if before.payment_status != after.payment_status {
            self.event_sender
                .send_or_log(Event::OrderPaymentStatusChanged {
                    order_id: after.id,
                    old_status: before.payment_status.as_str().to_string(),
                    new_status: after.payment_status.as_str().to_string(),
                })
                .await;
        }

        // Confirmation fires on the edge into paid only, so a duplicate
        // delivery does not re-notify. Dispatch must not delay the webhook
        // acknowledgment, hence the detached task.
        if after.payment_status == PaymentStatus::Paid
            && before.payment_status != PaymentStatus::Paid
        {
            if let Some(notifier) = &self.notifier {
                let notifier = notifier.clone();
                let order = after.clone();
                tokio::spawn(async move {
                    notifier.send_order_confirmation(&order).await;
                });
            }
        }

        Ok(Some(after))
    }
}
