use chrono::{DateTime, Local, Utc};
use serde::Deserialize;
use serde_json::Number;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Input file read when no path is given on the command line.
pub const DEFAULT_ORDERS_PATH: &str = "T1_USDT-orders.json";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed order data")]
    Json(#[from] serde_json::Error),
    #[error("timestamp {0} ms is out of range")]
    TimestampOutOfRange(i64),
    #[error("failed to write report")]
    Write(#[source] io::Error),
}

/// `OrderID2` is opaque: exchanges hand back either strings or numbers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OrderId {
    Number(Number),
    Text(String),
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderId::Number(n) => write!(f, "{}", n),
            OrderId::Text(s) => f.write_str(s),
        }
    }
}

/// Order quantity exactly as it appeared in the file. Numbers compare by
/// value (`1 == 1.0`), strings compare as text, and a string never equals a
/// number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Number(Number),
    Text(String),
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Amount::Number(a), Amount::Number(b)) => numbers_equal(a, b),
            (Amount::Text(a), Amount::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Number(n) => match n.as_f64() {
                Some(v) if !(n.is_i64() || n.is_u64()) => f.write_str(&format_float(v)),
                _ => write!(f, "{}", n),
            },
            Amount::Text(s) => f.write_str(s),
        }
    }
}

// Integers compare exactly, anything else by f64 value.
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Shortest round-trip digits. Fixed notation keeps a trailing `.0`;
/// exponents below -4 or from 16 up switch to `d.ddde±XX`.
pub fn format_float(value: f64) -> String {
    let sci = format!("{:e}", value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return value.to_string(),
    };
    let exp: i32 = match exp.parse() {
        Ok(exp) => exp,
        Err(_) => return value.to_string(),
    };
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        let body = if exp < 0 {
            format!("0.{}{}", "0".repeat((-exp - 1) as usize), digits)
        } else {
            let int_len = exp as usize + 1;
            if digits.len() <= int_len {
                format!("{}{}.0", digits, "0".repeat(int_len - digits.len()))
            } else {
                format!("{}.{}", &digits[..int_len], &digits[int_len..])
            }
        };
        format!("{}{}", sign, body)
    } else {
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exp.abs())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    #[serde(rename = "OrderID2")]
    pub order_id: OrderId,
    #[serde(rename = "Amount")]
    pub amount: Amount,
    #[serde(rename = "Side")]
    pub side: i64,
    #[serde(rename = "Timestamp")]
    pub timestamp: i64, // milliseconds since epoch
}

impl Order {
    pub const BUY: i64 = 1;

    pub fn side_label(&self) -> &'static str {
        side_label(self.side)
    }

    /// Two orders pair off when they trade the same amount on opposite sides.
    pub fn pairs_with(&self, other: &Order) -> bool {
        self.amount == other.amount && self.side != other.side
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairingReport {
    pub unmatched: Vec<Order>,
    pub matched_pairs: usize,
    /// Pending order left over when the input ran out. Never printed.
    pub trailing: Option<Order>,
}

pub fn side_label(side: i64) -> &'static str {
    if side == Order::BUY { "buy" } else { "sell" }
}

/// Renders epoch milliseconds as local wall-clock time, truncated to the second.
pub fn format_timestamp(millis: i64) -> Result<String, ReportError> {
    let utc = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(ReportError::TimestampOutOfRange(millis))?;
    Ok(utc.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string())
}

pub fn format_line(order: &Order) -> Result<String, ReportError> {
    Ok(format!(
        "id: {} amount: {} side: {} timestamp: {}",
        order.order_id,
        order.amount,
        order.side_label(),
        format_timestamp(order.timestamp)?
    ))
}

pub fn parse_orders(json: &str) -> Result<Vec<Order>, ReportError> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_orders(path: impl AsRef<Path>) -> Result<Vec<Order>, ReportError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let orders = parse_orders(&contents)?;
    info!(path = %path.display(), count = orders.len(), "loaded orders");
    Ok(orders)
}

/// Single pass with a one-order lookback. An order either pairs with the
/// pending one, or pushes the pending one out as unmatched and takes its place.
pub fn pair_orders(orders: &[Order]) -> PairingReport {
    let mut report = PairingReport::default();
    let mut pending: Option<&Order> = None;

    for order in orders {
        match pending {
            None => pending = Some(order),
            Some(prev) if order.pairs_with(prev) => {
                debug!(first = %prev.order_id, second = %order.order_id, "matched pair");
                report.matched_pairs += 1;
                pending = None;
            }
            Some(prev) => {
                debug!(order_id = %prev.order_id, "unmatched order");
                report.unmatched.push(prev.clone());
                pending = Some(order);
            }
        }
    }

    if let Some(last) = pending {
        debug!(order_id = %last.order_id, "trailing order left pending");
        report.trailing = Some(last.clone());
    }

    info!(
        matched_pairs = report.matched_pairs,
        unmatched = report.unmatched.len(),
        "pairing complete"
    );
    report
}

pub fn write_report<W: Write>(report: &PairingReport, out: &mut W) -> Result<(), ReportError> {
    for order in &report.unmatched {
        let line = format_line(order)?;
        writeln!(out, "{}", line).map_err(ReportError::Write)?;
    }
    Ok(())
}

pub fn run<W: Write>(path: impl AsRef<Path>, out: &mut W) -> Result<PairingReport, ReportError> {
    let orders = load_orders(path)?;
    let report = pair_orders(&orders);
    write_report(&report, out)?;
    Ok(report)
}
