// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Payment gateway events, normalised at the boundary.
//
// Gateways report in their own shapes. Each known provider gets a variant;
// everything downstream sees only a `Settlement`.

use serde::{Deserialize, Serialize};

use crate::types::Money;

/// A payment notification from a known gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum GatewayEvent {
    Stripe {
        payment_intent: String,
        status: StripeStatus,
        amount_received: Money,
    },
    Paypal {
        order_id: String,
        status: PaypalStatus,
        amount: Money,
    },
    /// Offline settlement confirmed by an operator (bank transfer, invoice).
    Manual {
        reference: String,
        amount: Money,
        confirmed_by: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StripeStatus {
    Processing,
    RequiresPaymentMethod,
    Succeeded,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaypalStatus {
    Created,
    Approved,
    Completed,
    Voided,
}

/// Normalised payment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Settled { amount: Money },
    Pending,
    Failed,
}

impl GatewayEvent {
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Stripe { .. } => "stripe",
            Self::Paypal { .. } => "paypal",
            Self::Manual { .. } => "manual",
        }
    }

    /// Gateway-side reference for logs.
    pub fn reference(&self) -> &str {
        match self {
            Self::Stripe { payment_intent, .. } => payment_intent,
            Self::Paypal { order_id, .. } => order_id,
            Self::Manual { reference, .. } => reference,
        }
    }

    pub fn settlement(&self) -> Settlement {
        match self {
            Self::Stripe {
                status,
                amount_received,
                ..
            } => match status {
                StripeStatus::Succeeded => Settlement::Settled {
                    amount: *amount_received,
                },
                StripeStatus::Processing | StripeStatus::RequiresPaymentMethod => {
                    Settlement::Pending
                }
                StripeStatus::Canceled => Settlement::Failed,
            },
            Self::Paypal { status, amount, .. } => match status {
                PaypalStatus::Completed => Settlement::Settled { amount: *amount },
                PaypalStatus::Created | PaypalStatus::Approved => Settlement::Pending,
                PaypalStatus::Voided => Settlement::Failed,
            },
            Self::Manual { amount, .. } => Settlement::Settled { amount: *amount },
        }
    }
}
