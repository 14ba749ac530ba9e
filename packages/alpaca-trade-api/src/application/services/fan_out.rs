//! Multi-Symbol Fan-out
//!
//! Pages shaped as `{ <key>: { <symbol>: [items] }, next_page_token }` are
//! flattened into `(symbol, item)` pairs:
//!
//! - symbols in response key order (not re-sorted)
//! - items in server order within a symbol
//! - `received` counts the aggregate across symbols, so a total cap of 5
//!   means 5 pairs overall, not 5 per symbol

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::pagination::{PageRequest, decode_item, drive};
use super::{DataError, DataStream};
use crate::application::ports::DataTransport;

/// One item of a multi-symbol response, tagged with its symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolItem<T> {
    /// Symbol key the item was listed under.
    pub symbol: String,
    /// The item.
    pub item: T,
}

/// Stream `(symbol, item)` pairs for `symbols` across all pages.
///
/// Symbols are sent as one comma-separated `symbols` parameter.
///
/// # Errors
///
/// Returns [`DataError::EmptySymbols`] if `symbols` is empty or contains an
/// empty string, and [`DataError::InvalidLimit`] for negative limits. Both are
/// raised before any request.
pub fn fan_out<T, I, S>(
    transport: Arc<dyn DataTransport>,
    symbols: I,
    request: PageRequest,
    cancel: CancellationToken,
) -> Result<DataStream<SymbolItem<T>>, DataError>
where
    T: DeserializeOwned + Send + 'static,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let request = request.param("symbols", join_symbols(symbols)?);
    drive(transport, request, cancel, Box::new(extract_symbol_lists::<T>))
}

/// Comma-join `symbols` for the `symbols` query parameter.
///
/// # Errors
///
/// Returns [`DataError::EmptySymbols`] if the list is empty or any symbol is
/// blank.
pub fn join_symbols<I, S>(symbols: I) -> Result<String, DataError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let symbols: Vec<String> = symbols
        .into_iter()
        .map(|symbol| symbol.as_ref().trim().to_string())
        .collect();
    if symbols.is_empty() || symbols.iter().any(String::is_empty) {
        return Err(DataError::EmptySymbols);
    }
    Ok(symbols.join(","))
}

/// Stream pages shaped as `{ <key>: { <symbol>: item } }`, one item per key.
///
/// Used by snapshot endpoints such as the option chain, where each key is a
/// contract symbol and counts as one item toward the limits.
///
/// # Errors
///
/// Returns [`DataError::InvalidLimit`] for negative limits.
pub fn keyed_pages<T>(
    transport: Arc<dyn DataTransport>,
    request: PageRequest,
    cancel: CancellationToken,
) -> Result<DataStream<SymbolItem<T>>, DataError>
where
    T: DeserializeOwned + Send + 'static,
{
    drive(transport, request, cancel, Box::new(extract_keyed_objects::<T>))
}

fn extract_symbol_lists<T: DeserializeOwned>(
    mut page: Value,
    key: &str,
) -> Result<Vec<SymbolItem<T>>, DataError> {
    let by_symbol = match page.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Object(by_symbol)) => by_symbol,
        Some(_) => {
            return Err(DataError::UnexpectedShape {
                key: key.to_string(),
                expected: "an object keyed by symbol",
            });
        }
    };

    let mut items = Vec::new();
    for (symbol, list) in by_symbol {
        let Value::Array(list) = list else {
            return Err(DataError::UnexpectedShape {
                key: format!("{key}.{symbol}"),
                expected: "an array",
            });
        };
        for item in list {
            items.push(SymbolItem {
                symbol: symbol.clone(),
                item: decode_item(key, item)?,
            });
        }
    }
    Ok(items)
}

fn extract_keyed_objects<T: DeserializeOwned>(
    mut page: Value,
    key: &str,
) -> Result<Vec<SymbolItem<T>>, DataError> {
    match page.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(by_symbol) => decode_keyed(by_symbol, key),
    }
}

/// Decode `{ <symbol>: item }` into tagged items, keeping key order.
pub(crate) fn decode_keyed<T: DeserializeOwned>(
    by_symbol: Value,
    key: &str,
) -> Result<Vec<SymbolItem<T>>, DataError> {
    let Value::Object(by_symbol) = by_symbol else {
        return Err(DataError::UnexpectedShape {
            key: key.to_string(),
            expected: "an object keyed by symbol",
        });
    };
    by_symbol
        .into_iter()
        .map(|(symbol, item)| -> Result<SymbolItem<T>, DataError> {
            Ok(SymbolItem {
                item: decode_item(key, item)?,
                symbol,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockDataTransport;
    use crate::domain::pagination::Limits;
    use futures::TryStreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn preserves_response_key_order() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|_, query| {
            assert!(query.contains(&("symbols".to_string(), "ZZZ,AAA".to_string())));
            Ok(json!({
                "trades": { "ZZZ": [1, 2], "AAA": [3] },
                "next_page_token": null
            }))
        });

        let items: Vec<SymbolItem<u32>> = fan_out(
            Arc::new(transport),
            ["ZZZ", "AAA"],
            PageRequest::new("/v2/stocks/trades", "trades"),
            CancellationToken::new(),
        )
        .unwrap()
        .try_collect()
        .await
        .unwrap();

        let pairs: Vec<(&str, u32)> = items.iter().map(|i| (i.symbol.as_str(), i.item)).collect();
        assert_eq!(pairs, [("ZZZ", 1), ("ZZZ", 2), ("AAA", 3)]);
    }

    #[test]
    fn empty_symbols_rejected_before_request() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(0);
        let transport: Arc<dyn DataTransport> = Arc::new(transport);

        let none: [&str; 0] = [];
        let result = fan_out::<u32, _, _>(
            transport.clone(),
            none,
            PageRequest::new("/v2/stocks/trades", "trades"),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(DataError::EmptySymbols)));

        let blank = fan_out::<u32, _, _>(
            transport,
            ["AAPL", " "],
            PageRequest::new("/v2/stocks/trades", "trades"),
            CancellationToken::new(),
        );
        assert!(matches!(blank, Err(DataError::EmptySymbols)));
    }

    #[tokio::test]
    async fn keyed_pages_count_each_key() {
        let mut transport = MockDataTransport::new();
        transport.expect_get_json().times(1).returning(|_, query| {
            assert!(query.contains(&("limit".to_string(), "2".to_string())));
            Ok(json!({
                "snapshots": { "AAPL240119C00100000": { "x": 1 }, "AAPL240119P00100000": { "x": 2 } },
                "next_page_token": "more"
            }))
        });

        let items: Vec<SymbolItem<serde_json::Value>> = keyed_pages(
            Arc::new(transport),
            PageRequest::new("/v1beta1/options/snapshots/AAPL", "snapshots")
                .limits(Limits::none().total(2)),
            CancellationToken::new(),
        )
        .unwrap()
        .try_collect()
        .await
        .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].symbol, "AAPL240119C00100000");
    }
}
