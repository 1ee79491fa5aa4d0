//! Per-account activity feed
//!
//! Funding rows and transfers (sent and received) merged into one list,
//! newest first. Ties on timestamp fall back to the reference so the order
//! is stable across reads. Transfer descriptions are written from the
//! viewing account's side.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::account::PhoneNumber;
use crate::core_types::{AccountId, MinorUnits};
use crate::event_log::AccountEvents;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    Funding { provider: String },
    Sent { to: AccountId },
    Received { from: AccountId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityEntry {
    /// Idempotency token for funding, transaction id for transfers
    pub reference: String,
    pub kind: ActivityKind,
    pub amount: MinorUnits,
    pub status: &'static str,
    pub description: String,
    pub at: DateTime<Utc>,
}

/// Transfer counterparties of `account_id`, deduplicated
pub fn counterparties(account_id: AccountId, events: &AccountEvents) -> Vec<AccountId> {
    let mut ids: Vec<AccountId> = events
        .transfers
        .iter()
        .filter_map(|t| {
            if t.sender_id == account_id {
                Some(t.receiver_id)
            } else if t.receiver_id == account_id {
                Some(t.sender_id)
            } else {
                None
            }
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn label(phones: &HashMap<AccountId, PhoneNumber>, account_id: AccountId) -> String {
    phones
        .get(&account_id)
        .map(|p| p.to_string())
        .unwrap_or_else(|| format!("account {}", account_id))
}

/// `phones` maps counterparty ids to their numbers; a missing entry falls
/// back to the account id.
pub fn account_activity(
    account_id: AccountId,
    events: &AccountEvents,
    phones: &HashMap<AccountId, PhoneNumber>,
    limit: usize,
) -> Vec<ActivityEntry> {
    let funding = events
        .funding
        .iter()
        .filter(|f| f.account_id == account_id)
        .map(|f| ActivityEntry {
            reference: f.idempotency_token.to_string(),
            kind: ActivityKind::Funding {
                provider: f.provider.clone(),
            },
            amount: f.amount,
            status: f.status.as_str(),
            description: format!("Funding via {}", f.provider),
            at: f.settled_at.unwrap_or(f.created_at),
        });

    let transfers = events
        .transfers
        .iter()
        .filter(|t| t.sender_id == account_id || t.receiver_id == account_id)
        .map(|t| {
            let (kind, description) = if t.sender_id == account_id {
                (
                    ActivityKind::Sent { to: t.receiver_id },
                    format!("Sent to {}", label(phones, t.receiver_id)),
                )
            } else {
                (
                    ActivityKind::Received { from: t.sender_id },
                    format!("Received from {}", label(phones, t.sender_id)),
                )
            };
            ActivityEntry {
                reference: t.transaction_id.to_string(),
                kind,
                amount: t.amount,
                status: t.status.as_str(),
                description,
                at: t.processed_at,
            }
        });

    let mut entries: Vec<ActivityEntry> = funding.chain(transfers).collect();
    entries.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| b.reference.cmp(&a.reference)));
    entries.truncate(limit);
    entries
}
