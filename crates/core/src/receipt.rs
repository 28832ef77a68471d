//! Order amounts and the receipt view model.
//!
//! [`OrderAmounts::compute`] is the single place checkout arithmetic happens.
//! The live order summary, the authorization request, the persisted order and
//! the post-payment receipt all call it, so they agree to the cent.
//!
//! All prices are VAT-inclusive at 25 %. The VAT portion is extracted, never
//! added: `inclusive * 25 / 125 = inclusive * 0.2`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::types::{BasketLine, FormData, OrderNumber, OrderStatus, PaymentReference, PostalAddress};

pub const STANDARD_DELIVERY: &str = "Standard delivery";
pub const EXPRESS_DELIVERY: &str = "Express delivery";
pub const PERSONAL_PICKUP: &str = "Personal pickup";

/// Share of a VAT-inclusive price that is VAT.
pub const VAT_SHARE: Decimal = dec!(0.2);

/// Delivery options offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum ShippingMethod {
    #[default]
    Standard,
    Express,
    Pickup,
}

impl ShippingMethod {
    /// Resolve a method from its display name.
    ///
    /// Matching is exact. Unknown names fall back to zero-cost standard
    /// delivery.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            EXPRESS_DELIVERY => Self::Express,
            PERSONAL_PICKUP => Self::Pickup,
            _ => Self::Standard,
        }
    }

    /// Display name, as selected on the form.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Standard => STANDARD_DELIVERY,
            Self::Express => EXPRESS_DELIVERY,
            Self::Pickup => PERSONAL_PICKUP,
        }
    }

    /// Shipping cost, VAT-inclusive.
    #[must_use]
    pub const fn cost(&self) -> Decimal {
        match self {
            Self::Standard | Self::Pickup => Decimal::ZERO,
            Self::Express => dec!(10.00),
        }
    }
}

/// The four numbers every order view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAmounts {
    /// Sum of line totals, VAT-inclusive.
    pub subtotal: Decimal,
    pub shipping: Decimal,
    /// VAT contained in the subtotal.
    pub vat: Decimal,
    /// `subtotal + shipping`.
    pub total: Decimal,
}

impl OrderAmounts {
    /// Compute amounts for a basket and a shipping method name.
    #[must_use]
    pub fn compute(lines: &[BasketLine], shipping_method: &str) -> Self {
        let subtotal: Decimal = lines.iter().map(BasketLine::line_total).sum();
        let shipping = ShippingMethod::from_name(shipping_method).cost();
        Self {
            subtotal,
            shipping,
            vat: subtotal * VAT_SHARE,
            total: subtotal + shipping,
        }
    }
}

/// One line on the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub options: Vec<(String, String)>,
}

/// Company details when an invoice was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDetails {
    pub company_name: String,
    pub tax_id: String,
}

/// Everything the confirmation screen renders. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub order_number: OrderNumber,
    pub payment_reference: PaymentReference,
    pub status: OrderStatus,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub billing_address: PostalAddress,
    pub delivery_address: PostalAddress,
    pub invoice: Option<InvoiceDetails>,
    pub shipping_method: &'static str,
    pub lines: Vec<ReceiptLine>,
    pub amounts: OrderAmounts,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
}

/// Identity of a recorded order, as needed by [`assemble`].
#[derive(Debug, Clone)]
pub struct OrderIdentity<'a> {
    pub order_number: &'a OrderNumber,
    pub payment_reference: &'a PaymentReference,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
}

/// Build the receipt view model. Pure and idempotent.
#[must_use]
pub fn assemble(identity: &OrderIdentity<'_>, lines: &[BasketLine], form: &FormData) -> Receipt {
    let amounts = OrderAmounts::compute(lines, &form.shipping_method);
    let notes = form.notes.trim();

    Receipt {
        order_number: identity.order_number.clone(),
        payment_reference: identity.payment_reference.clone(),
        status: identity.status,
        customer_name: form.full_name(),
        email: form.email.trim().to_owned(),
        phone: form.phone.trim().to_owned(),
        billing_address: form.billing_address(),
        delivery_address: form.delivery_address(),
        invoice: form.needs_company_invoice.then(|| InvoiceDetails {
            company_name: form.company_name.trim().to_owned(),
            tax_id: form.company_tax_id.trim().to_owned(),
        }),
        shipping_method: ShippingMethod::from_name(&form.shipping_method).name(),
        lines: lines.iter().map(receipt_line).collect(),
        amounts,
        notes: (!notes.is_empty()).then(|| notes.to_owned()),
        placed_at: identity.placed_at,
    }
}

fn receipt_line(line: &BasketLine) -> ReceiptLine {
    ReceiptLine {
        product_name: line.product_name.clone(),
        quantity: line.quantity,
        unit_price: line.effective_unit_price(),
        line_total: line.line_total(),
        options: line
            .options
            .iter()
            .map(|(key, value)| {
                let value = value
                    .as_str()
                    .map_or_else(|| value.to_string(), str::to_owned);
                (key.clone(), value)
            })
            .collect(),
    }
}
