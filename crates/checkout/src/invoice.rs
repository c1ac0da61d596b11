//! Invoice document generation.
//!
//! The document's data set is fixed (recipient, line items, totals,
//! delivery info); the layout is a deterministic plain-text rendering
//! served as a binary attachment.

use domain::{Cart, Customer, Order};

/// A generated invoice, ready for download.
#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    /// `invoice-<order_id>.txt`
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Renders the invoice for a committed order.
pub fn generate(order: &Order, customer: &Customer, cart: &Cart) -> InvoiceDocument {
    let mut doc = String::new();

    doc.push_str(&format!("INVOICE invoice-{}\n", order.id));
    doc.push_str(&format!(
        "Date: {}\n",
        order.created_at.format("%Y-%m-%d %H:%M UTC")
    ));
    doc.push_str(&format!("Order: {}\n\n", order.id));

    doc.push_str(&format!("Billed to: {} <{}>\n\n", customer.name, customer.email));

    doc.push_str("Items\n");
    for line in &cart.lines {
        doc.push_str(&format!(
            "  {:>3} x {:<30} @ {:>10}  = {:>10}\n",
            line.quantity,
            line.product_name,
            line.unit_price.to_string(),
            line.subtotal.to_string(),
        ));
    }
    doc.push('\n');

    doc.push_str(&format!("{:<18}{:>10}\n", "Subtotal:", order.total.to_string()));
    doc.push_str(&format!(
        "{:<18}{:>10}\n",
        "Discount:",
        format!("-{}", order.discount)
    ));
    doc.push_str(&format!(
        "{:<18}{:>10}\n",
        "Delivery fee:",
        order.delivery_fee.to_string()
    ));
    doc.push_str(&format!(
        "{:<18}{:>10}\n\n",
        "Amount due:",
        order.amount_due.to_string()
    ));

    doc.push_str(&format!(
        "Points earned: {}   Points redeemed: {}\n\n",
        order.points_earned, order.points_redeemed
    ));

    doc.push_str("Delivery\n");
    doc.push_str(&format!("  Status: {}\n", order.delivery.status));
    doc.push_str(&format!("  To: {}\n", order.delivery.settlement_note));
    if let Some(carrier) = &order.delivery.carrier {
        doc.push_str(&format!("  Carrier: {carrier}\n"));
    }
    doc.push_str(&format!(
        "  Target date: {}\n",
        order.delivery_date.format("%Y-%m-%d")
    ));

    InvoiceDocument {
        filename: format!("invoice-{}.txt", order.id),
        content_type: "application/octet-stream",
        bytes: doc.into_bytes(),
    }
}
