//! Paperwork rendering
//!
//! Office orders, works orders and carton label sheets are rendered as CSV.
//! The completion check only sees the `DocumentGenerator` trait.

use rust_decimal::Decimal;
use shared::{Order, OrderLineItem, StockItem};

use crate::error::{AppError, AppResult};

/// GST applied to the office-order subtotal, in percent
const GST_PERCENT: i64 = 10;

/// Renders order paperwork. Implementations must be pure: the same inputs
/// always give the same bytes and nothing is written anywhere.
pub trait DocumentGenerator: Send + Sync {
    /// Customer-facing summary; always at the ordered quantities
    fn office_order(&self, order: &Order, items: &[OrderLineItem]) -> AppResult<Vec<u8>>;

    /// Production instruction for one line. `adjusted_quantity` is `None`
    /// when no stock was credited.
    fn works_order(
        &self,
        order: &Order,
        item: &OrderLineItem,
        adjusted_quantity: Option<i32>,
        verified_stock: Option<i32>,
    ) -> AppResult<Vec<u8>>;
}

/// Default CSV renderer
#[derive(Clone)]
pub struct CsvDocumentGenerator {
    company_name: String,
}

impl CsvDocumentGenerator {
    pub fn new(company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
        }
    }
}

fn render_err(e: impl std::fmt::Display) -> AppError {
    AppError::DocumentGeneration(e.to_string())
}

fn finish(writer: csv::Writer<Vec<u8>>) -> AppResult<Vec<u8>> {
    writer.into_inner().map_err(|e| render_err(e.error()))
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn display_code(item: &OrderLineItem) -> String {
    item.product_code
        .clone()
        .or_else(|| item.matched_product_code.clone())
        .unwrap_or_default()
}

/// Stock note printed on a works order, if any stock was credited
pub fn stock_note(verified_stock: Option<i32>, produce: i32) -> Option<String> {
    verified_stock
        .filter(|stock| *stock > 0)
        .map(|stock| format!("Stock on hand: {}, Produce: {}", stock, produce))
}

impl DocumentGenerator for CsvDocumentGenerator {
    fn office_order(&self, order: &Order, items: &[OrderLineItem]) -> AppResult<Vec<u8>> {
        let mut w = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());

        w.write_record([self.company_name.as_str()]).map_err(render_err)?;
        w.write_record(["OFFICE ORDER"]).map_err(render_err)?;
        w.write_record([
            "Customer:",
            order.customer_name.as_deref().unwrap_or(""),
            "PO #:",
            order.po_number.as_deref().unwrap_or(""),
        ])
        .map_err(render_err)?;
        w.write_record([
            "PO Date:".to_string(),
            opt(order.po_date),
            "Delivery:".to_string(),
            opt(order.delivery_date),
        ])
        .map_err(render_err)?;

        w.write_record(["Line", "Product Code", "Description", "Colour", "Qty", "Unit Price", "Line Total"])
            .map_err(render_err)?;

        let mut lines: Vec<&OrderLineItem> = items.iter().collect();
        lines.sort_by_key(|item| item.line_number);

        let mut subtotal = Decimal::ZERO;
        for item in lines {
            if let Some(total) = item.line_total {
                subtotal += total.round_dp(2);
            }
            w.write_record([
                item.line_number.to_string(),
                display_code(item),
                item.product_description.clone().unwrap_or_default(),
                item.colour.clone().unwrap_or_default(),
                item.quantity.to_string(),
                opt(item.unit_price),
                opt(item.line_total),
            ])
            .map_err(render_err)?;
        }

        let gst = (subtotal * Decimal::new(GST_PERCENT, 2)).round_dp(2);
        w.write_record(["Subtotal".to_string(), subtotal.to_string()]).map_err(render_err)?;
        w.write_record(["GST (10%)".to_string(), gst.to_string()]).map_err(render_err)?;
        w.write_record(["Total (inc. GST)".to_string(), (subtotal + gst).to_string()])
            .map_err(render_err)?;

        if let Some(instructions) = order.special_instructions.as_deref().filter(|s| !s.trim().is_empty()) {
            w.write_record(["Special Instructions", instructions]).map_err(render_err)?;
        }

        finish(w)
    }

    fn works_order(
        &self,
        order: &Order,
        item: &OrderLineItem,
        adjusted_quantity: Option<i32>,
        verified_stock: Option<i32>,
    ) -> AppResult<Vec<u8>> {
        let produce = adjusted_quantity.unwrap_or(item.quantity);
        let mut w = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());

        w.write_record([self.company_name.as_str()]).map_err(render_err)?;
        w.write_record(["WORKS ORDER"]).map_err(render_err)?;
        w.write_record([
            "WO #:".to_string(),
            order.works_order_number(item.line_number),
            "PO #:".to_string(),
            order.po_number.clone().unwrap_or_default(),
        ])
        .map_err(render_err)?;
        w.write_record([
            "Customer:".to_string(),
            order.customer_name.clone().unwrap_or_default(),
            "PO Date:".to_string(),
            opt(order.po_date),
        ])
        .map_err(render_err)?;
        w.write_record([
            "Product Code:".to_string(),
            display_code(item),
            "Delivery Date:".to_string(),
            opt(order.delivery_date),
        ])
        .map_err(render_err)?;
        w.write_record([
            "Description:".to_string(),
            item.product_description.clone().unwrap_or_default(),
            "Colour:".to_string(),
            item.colour.clone().unwrap_or_default(),
        ])
        .map_err(render_err)?;
        w.write_record([
            "Ordered Qty:".to_string(),
            item.quantity.to_string(),
            "Produce Qty:".to_string(),
            produce.to_string(),
        ])
        .map_err(render_err)?;

        if let Some(note) = stock_note(verified_stock, produce) {
            w.write_record(["Stock Note:".to_string(), note]).map_err(render_err)?;
        }

        finish(w)
    }
}

/// One row per carton label: barcode, product, colour, quantity, date and
/// the box text printed at the bottom.
pub fn render_label_sheet(cartons: &[StockItem]) -> AppResult<Vec<u8>> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(["barcode", "product_code", "colour", "quantity", "production_date", "box"])
        .map_err(render_err)?;

    for carton in cartons {
        w.write_record([
            carton.barcode_id.clone(),
            carton.product_code.clone(),
            carton.colour.clone(),
            carton.quantity.to_string(),
            carton.production_date.format("%d/%m/%Y").to_string(),
            carton.box_type.label_text().to_string(),
        ])
        .map_err(render_err)?;
    }

    finish(w)
}
