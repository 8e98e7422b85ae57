//! CSV format handling for replay commands and balance output
//!
//! This module centralizes all CSV format concerns, providing:
//! - `CsvRecord` structure for deserialization
//! - Conversion from CSV records to validated `Command`s
//! - Balance output serialization
//!
//! # Input columns
//!
//! `type,user,ref,target,currency,counter,amount,counter_amount,min,max,detail`
//!
//! | type     | user   | ref       | target    | currency | counter | amount | counter_amount | min/max      | detail            |
//! |----------|--------|-----------|-----------|----------|---------|--------|----------------|--------------|-------------------|
//! | deposit  | user   | ext. ref  |           | currency |         | amount |                |              |                   |
//! | withdraw | user   | ext. ref? |           | currency |         | amount |                |              |                   |
//! | offer    | owner  | offer ref |           | crypto   | fiat    | crypto | fiat           | trade limits | side, `:`methods  |
//! | trade    | buyer  | trade ref | offer ref |          |         | fiat   |                |              |                   |
//! | confirm  | buyer  |           | trade ref |          |         |        |                |              | payment proof     |
//! | release  | seller |           | trade ref |          |         |        |                |              |                   |
//! | cancel   | user   |           | trade ref |          |         |        |                |              | `admin`?          |
//! | expire   |        |           | trade ref |          |         |        |                |              |                   |
//! | order    | user   |           |           | base     | quote   | base   |                |              | side              |
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{
    Balance, BalanceKey, Command, Currency, NewOffer, NewOrder, OfferSide, OrderSide, UserId,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Every column but `type` is optional; which ones are required depends on
/// the command.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub user: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub target: Option<String>,
    pub currency: Option<String>,
    pub counter: Option<String>,
    pub amount: Option<String>,
    pub counter_amount: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub detail: Option<String>,
}

/// Column accessors that report which command is missing what
struct Fields<'a> {
    record: &'a CsvRecord,
    kind: &'static str,
}

impl<'a> Fields<'a> {
    fn optional(value: &'a Option<String>) -> Option<&'a str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    fn required(&self, value: &'a Option<String>, column: &str) -> Result<&'a str, String> {
        Self::optional(value).ok_or_else(|| format!("{} requires '{}'", self.kind, column))
    }

    fn text(&self, value: &'a Option<String>, column: &str) -> Result<String, String> {
        self.required(value, column).map(str::to_string)
    }

    fn user(&self) -> Result<UserId, String> {
        self.required(&self.record.user, "user").map(UserId::from)
    }

    fn decimal(&self, value: &'a Option<String>, column: &str) -> Result<Decimal, String> {
        let raw = self.required(value, column)?;
        Decimal::from_str(raw)
            .map_err(|_| format!("Invalid {} '{}' for {}", column, raw, self.kind))
    }

    fn currency(&self, value: &'a Option<String>, column: &str) -> Result<Currency, String> {
        Currency::parse(self.required(value, column)?).map_err(|e| e.to_string())
    }
}

/// Convert a CsvRecord to a Command
///
/// Parses the command type (case-insensitive), checks that every column the
/// command needs is present, and parses amounts and currency codes. Business
/// rules (positive amounts, trade limits) are left to the engines.
///
/// # Returns
///
/// - `Ok(Command)` - successfully converted record
/// - `Err(String)` - what is wrong with the record
pub fn convert_csv_record(record: CsvRecord) -> Result<Command, String> {
    let kind = match record.kind.trim().to_lowercase().as_str() {
        "deposit" => "deposit",
        "withdraw" | "withdrawal" => "withdraw",
        "offer" => "offer",
        "trade" => "trade",
        "confirm" => "confirm",
        "release" => "release",
        "cancel" => "cancel",
        "expire" => "expire",
        "order" => "order",
        _ => return Err(format!("Invalid command type: '{}'", record.kind)),
    };
    let f = Fields {
        record: &record,
        kind,
    };

    let command = match kind {
        "deposit" => Command::Deposit {
            user: f.user()?,
            currency: f.currency(&record.currency, "currency")?,
            amount: f.decimal(&record.amount, "amount")?,
            reference: f.text(&record.reference, "ref")?,
        },
        "withdraw" => Command::Withdraw {
            user: f.user()?,
            currency: f.currency(&record.currency, "currency")?,
            amount: f.decimal(&record.amount, "amount")?,
            reference: Fields::optional(&record.reference).map(str::to_string),
        },
        "offer" => {
            let (side, methods) = offer_detail(Fields::optional(&record.detail))?;
            Command::Offer {
                reference: f.text(&record.reference, "ref")?,
                offer: NewOffer {
                    owner: f.user()?,
                    side,
                    crypto_currency: f.currency(&record.currency, "currency")?,
                    fiat_currency: f.currency(&record.counter, "counter")?,
                    crypto_amount: f.decimal(&record.amount, "amount")?,
                    fiat_amount: f.decimal(&record.counter_amount, "counter_amount")?,
                    min_trade: f.decimal(&record.min, "min")?,
                    max_trade: f.decimal(&record.max, "max")?,
                    payment_methods: methods,
                    expires_at: None,
                },
            }
        }
        "trade" => Command::Trade {
            reference: f.text(&record.reference, "ref")?,
            offer: f.text(&record.target, "target")?,
            buyer: f.user()?,
            fiat_amount: f.decimal(&record.amount, "amount")?,
        },
        "confirm" => Command::Confirm {
            trade: f.text(&record.target, "target")?,
            user: f.user()?,
            proof: Fields::optional(&record.detail).map(str::to_string),
        },
        "release" => Command::Release {
            trade: f.text(&record.target, "target")?,
            user: f.user()?,
        },
        "cancel" => {
            let admin = Fields::optional(&record.detail)
                .is_some_and(|d| d.eq_ignore_ascii_case("admin"));
            let user = match (Fields::optional(&record.user), admin) {
                (Some(user), _) => UserId::from(user),
                (None, true) => UserId::from("admin"),
                (None, false) => f.user()?,
            };
            Command::Cancel {
                trade: f.text(&record.target, "target")?,
                user,
                admin,
            }
        }
        "expire" => Command::Expire {
            trade: f.text(&record.target, "target")?,
        },
        _ => Command::Order(NewOrder {
            user: f.user()?,
            side: order_side(f.required(&record.detail, "detail")?)?,
            base: f.currency(&record.currency, "currency")?,
            quote: f.currency(&record.counter, "counter")?,
            amount: f.decimal(&record.amount, "amount")?,
        }),
    };

    Ok(command)
}

/// `SELL` or `BUY`, optionally followed by `:`-separated payment methods
fn offer_detail(detail: Option<&str>) -> Result<(OfferSide, Vec<String>), String> {
    let Some(detail) = detail else {
        return Ok((OfferSide::Sell, Vec::new()));
    };
    let mut parts = detail.split(':');
    let side = match parts.next().map(|s| s.trim().to_lowercase()).as_deref() {
        Some("sell") => OfferSide::Sell,
        Some("buy") => OfferSide::Buy,
        _ => return Err(format!("Invalid offer side in '{}'", detail)),
    };
    let methods = parts
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    Ok((side, methods))
}

fn order_side(detail: &str) -> Result<OrderSide, String> {
    match detail.to_lowercase().as_str() {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        _ => Err(format!("Invalid order side '{}'", detail)),
    }
}

/// Write balances to CSV format
///
/// Columns: `user,currency,available,locked,total`, sorted by user then
/// currency. Amounts are printed without trailing zeros.
pub fn write_balances_csv(
    balances: &[(BalanceKey, Balance)],
    output: &mut dyn Write,
) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);
    writer
        .write_record(["user", "currency", "available", "locked", "total"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = balances.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    for (key, balance) in sorted {
        writer
            .write_record(&[
                key.user.to_string(),
                key.currency.to_string(),
                balance.available().normalize().to_string(),
                balance.locked().normalize().to_string(),
                balance.amount().normalize().to_string(),
            ])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn record(kind: &str) -> CsvRecord {
        CsvRecord {
            kind: kind.to_string(),
            ..Default::default()
        }
    }

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[rstest]
    #[case("deposit")]
    #[case("DEPOSIT")]
    #[case(" Deposit ")]
    fn test_convert_deposit(#[case] kind: &str) {
        let rec = CsvRecord {
            user: some("alice"),
            reference: some("pix-1"),
            currency: some("brl"),
            amount: some(" 100.50 "),
            ..record(kind)
        };

        assert_eq!(
            convert_csv_record(rec).unwrap(),
            Command::Deposit {
                user: "alice".into(),
                currency: Currency::parse("BRL").unwrap(),
                amount: dec!(100.50),
                reference: "pix-1".to_string(),
            }
        );
    }

    #[test]
    fn test_convert_offer_with_methods() {
        let rec = CsvRecord {
            user: some("seller"),
            reference: some("o1"),
            currency: some("BTC"),
            counter: some("BRL"),
            amount: some("0.1"),
            counter_amount: some("35000"),
            min: some("100"),
            max: some("35000"),
            detail: some("sell:PIX:TED"),
            ..record("offer")
        };

        match convert_csv_record(rec).unwrap() {
            Command::Offer { reference, offer } => {
                assert_eq!(reference, "o1");
                assert_eq!(offer.side, OfferSide::Sell);
                assert_eq!(offer.payment_methods, vec!["PIX", "TED"]);
                assert_eq!(offer.fiat_amount, dec!(35000));
            }
            other => panic!("expected offer, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_admin_cancel_without_user() {
        let rec = CsvRecord {
            target: some("t1"),
            detail: some("ADMIN"),
            ..record("cancel")
        };
        match convert_csv_record(rec).unwrap() {
            Command::Cancel { trade, admin, .. } => {
                assert_eq!(trade, "t1");
                assert!(admin);
            }
            other => panic!("expected cancel, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_order() {
        let rec = CsvRecord {
            user: some("alice"),
            currency: some("BTC"),
            counter: some("BRL"),
            amount: some("0.01"),
            detail: some("buy"),
            ..record("order")
        };
        match convert_csv_record(rec).unwrap() {
            Command::Order(order) => {
                assert_eq!(order.side, OrderSide::Buy);
                assert_eq!(order.amount, dec!(0.01));
            }
            other => panic!("expected order, got {:?}", other),
        }
    }

    #[rstest]
    #[case::invalid_type(record("dispute"), "Invalid command type")]
    #[case::deposit_missing_amount(
        CsvRecord {
            user: some("a"),
            reference: some("r"),
            currency: some("BRL"),
            ..record("deposit")
        },
        "requires 'amount'"
    )]
    #[case::blank_amount(
        CsvRecord {
            user: some("a"),
            reference: some("r"),
            currency: some("BRL"),
            amount: some("  "),
            ..record("deposit")
        },
        "requires 'amount'"
    )]
    #[case::bad_amount(
        CsvRecord {
            user: some("a"),
            reference: some("r"),
            currency: some("BRL"),
            amount: some("lots"),
            ..record("deposit")
        },
        "Invalid amount"
    )]
    #[case::bad_currency(
        CsvRecord {
            user: some("a"),
            reference: some("r"),
            currency: some("R$"),
            amount: some("1"),
            ..record("deposit")
        },
        "Invalid currency"
    )]
    #[case::trade_missing_target(
        CsvRecord { user: some("b"), reference: some("t1"), amount: some("1"), ..record("trade") },
        "requires 'target'"
    )]
    #[case::cancel_missing_user(
        CsvRecord { target: some("t1"), ..record("cancel") },
        "requires 'user'"
    )]
    #[case::bad_order_side(
        CsvRecord {
            user: some("a"),
            currency: some("BTC"),
            counter: some("BRL"),
            amount: some("1"),
            detail: some("hold"),
            ..record("order")
        },
        "Invalid order side"
    )]
    #[case::bad_offer_side(
        CsvRecord {
            user: some("s"), reference: some("o"), currency: some("BTC"), counter: some("BRL"),
            amount: some("1"), counter_amount: some("10"), min: some("1"), max: some("10"),
            detail: some("lend"), ..record("offer")
        },
        "Invalid offer side"
    )]
    fn test_convert_errors(#[case] rec: CsvRecord, #[case] expected: &str) {
        let err = convert_csv_record(rec).unwrap_err();
        assert!(err.contains(expected), "'{}' does not mention '{}'", err, expected);
    }

    fn row(user: &str, currency: &str, amount: Decimal, locked: Decimal) -> (BalanceKey, Balance) {
        (
            BalanceKey::new(user.into(), Currency::parse(currency).unwrap()),
            Balance::new(amount, locked).unwrap(),
        )
    }

    #[rstest]
    #[case::empty(vec![], "user,currency,available,locked,total\n")]
    #[case::sorted_by_user_then_currency(
        vec![
            row("bob", "BRL", dec!(5), dec!(0)),
            row("alice", "BTC", dec!(1.50000000), dec!(0.5)),
            row("alice", "BRL", dec!(100.00), dec!(0)),
        ],
        "user,currency,available,locked,total\n\
         alice,BRL,100,0,100\n\
         alice,BTC,1,0.5,1.5\n\
         bob,BRL,5,0,5\n"
    )]
    fn test_write_balances_csv(
        #[case] balances: Vec<(BalanceKey, Balance)>,
        #[case] expected: &str,
    ) {
        let mut output = Vec::new();
        write_balances_csv(&balances, &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }
}
