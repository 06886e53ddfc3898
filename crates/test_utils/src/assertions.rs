//! Custom Test Assertions
//!
//! Assertion helpers that print the offending record instead of a bare
//! `false`.

use rust_decimal::Decimal;

use app_services::QuoteReadModel;
use core_kernel::{Money, StoredEvent};
use domain_quote::QuoteState;

/// Asserts the stream starts at the genesis sequence 0 and has no gaps
pub fn assert_contiguous_sequences(events: &[StoredEvent]) {
    for (index, event) in events.iter().enumerate() {
        let expected = index as u64;
        assert_eq!(
            event.sequence_number, expected,
            "event {} ({}) has sequence {}, expected {}",
            index, event.event_type, event.sequence_number, expected
        );
    }
}

/// Asserts the stream's event types, in order
pub fn assert_event_types(events: &[StoredEvent], expected: &[&str]) {
    let actual: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(actual, expected, "unexpected event stream");
}

pub fn assert_quote_state(quote: &QuoteReadModel, expected: QuoteState) {
    assert_eq!(
        quote.state, expected,
        "quote {} is {:?}, expected {:?}",
        quote.quote_id, quote.state, expected
    );
}

/// Asserts the quote's total premium equals `expected` in its own currency
pub fn assert_total_premium(quote: &QuoteReadModel, expected: Decimal) {
    let total = quote
        .total_premium
        .unwrap_or_else(|| panic!("quote {} has no premium", quote.quote_id));
    assert_money_amount(&total, expected);
}

pub fn assert_money_amount(money: &Money, expected: Decimal) {
    assert_eq!(
        money.amount(),
        expected,
        "expected {} {}, got {} {}",
        money.currency().code(),
        expected,
        money.currency().code(),
        money.amount()
    );
}
