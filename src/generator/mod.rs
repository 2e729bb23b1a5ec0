//! Simulated credit card transaction feed with injected fraud.
//!
//! Each card keeps a sticky "home" IP that changes rarely; fraudulent
//! transactions use a fresh IP and a large amount. A simulated clock advances
//! between one second and one hour per transaction.

pub mod receivers;

use crate::config::GeneratorConfig;
use crate::pubsub::{Publisher, PubsubMessage};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use receivers::RECEIVERS;

pub const FRAUD_MIN_AMOUNT: f64 = 2000.0;
pub const FRAUD_MAX_AMOUNT: f64 = 7000.0;
pub const NORMAL_MIN_AMOUNT: f64 = 1.0;
pub const NORMAL_MAX_AMOUNT: f64 = 500.0;
pub const IP_CHANGE_PROBABILITY: f64 = 0.005;
const MIN_CLOCK_STEP_MS: i64 = 1_000;
const MAX_CLOCK_STEP_MS: i64 = 3_600_000;
/// The simulated clock starts this far in the past (about six months).
const CLOCK_START_OFFSET_MINUTES: i64 = 262_800;

/// One simulated transaction, serialized as the agent expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub credit_card_number: String,
    pub receiver: String,
    pub amount: f64,
    pub ip_address: String,
    pub timestamp: String,
}

impl TransactionEvent {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode transaction")
    }

    /// Message ordered by card number so one card's history stays in sequence.
    pub fn to_message(&self) -> Result<PubsubMessage> {
        Ok(PubsubMessage::new(self.to_json()?).with_ordering_key(&self.credit_card_number))
    }
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub fraud_probability: f64,
    pub ip_change_probability: f64,
    pub card_pool_size: usize,
    pub seed: Option<u64>,
}

impl GeneratorSettings {
    pub fn from_config(config: &GeneratorConfig, seed: Option<u64>) -> Self {
        Self {
            fraud_probability: config.fraud_probability,
            card_pool_size: config.card_pool_size,
            seed,
            ..Self::default()
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            fraud_probability: 0.02,
            ip_change_probability: IP_CHANGE_PROBABILITY,
            card_pool_size: 10_000,
            seed: None,
        }
    }
}

pub struct TransactionGenerator {
    rng: StdRng,
    cards: Vec<String>,
    home_ips: HashMap<String, String>,
    clock: DateTime<Utc>,
    fraud_probability: f64,
    ip_change_probability: f64,
}

fn random_digits(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// 40% `4200…` (16 digits), 40% `5500…` (16 digits), 20% `3700…` (15 digits).
fn card_number(rng: &mut StdRng) -> String {
    match rng.gen_range(0..10) {
        0..=3 => format!("4200{}", random_digits(rng, 12)),
        4..=7 => format!("5500{}", random_digits(rng, 12)),
        _ => format!("3700{}", random_digits(rng, 11)),
    }
}

fn random_ip(rng: &mut StdRng) -> String {
    format!(
        "{}.{}.{}.{}",
        rng.gen::<u8>(),
        rng.gen::<u8>(),
        rng.gen::<u8>(),
        rng.gen::<u8>()
    )
}

fn amount_between(rng: &mut StdRng, min: f64, max: f64) -> f64 {
    let raw = min + (max - min) * rng.gen::<f64>();
    (raw * 100.0).round() / 100.0
}

/// `YYYY-MM-DDTHH:MM:SS`, with `.mmm` appended when milliseconds are non-zero.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    if at.nanosecond() / 1_000_000 == 0 {
        at.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }
}

impl TransactionGenerator {
    pub fn new(settings: &GeneratorSettings) -> Self {
        let start = Utc::now() - ChronoDuration::minutes(CLOCK_START_OFFSET_MINUTES);
        Self::starting_at(settings, start)
    }

    pub fn starting_at(settings: &GeneratorSettings, start: DateTime<Utc>) -> Self {
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let cards = (0..settings.card_pool_size.max(1))
            .map(|_| card_number(&mut rng))
            .collect::<Vec<_>>();
        tracing::debug!(cards = cards.len(), "Generated card pool");

        Self {
            rng,
            cards,
            home_ips: HashMap::new(),
            clock: start,
            fraud_probability: settings.fraud_probability,
            ip_change_probability: settings.ip_change_probability,
        }
    }

    pub fn cards(&self) -> &[String] {
        &self.cards
    }

    fn advance_clock(&mut self) -> DateTime<Utc> {
        let step = self.rng.gen_range(MIN_CLOCK_STEP_MS..=MAX_CLOCK_STEP_MS);
        self.clock += ChronoDuration::milliseconds(step);
        self.clock
    }

    fn sticky_ip(&mut self, card: &str) -> String {
        let change = self.rng.gen_bool(self.ip_change_probability.clamp(0.0, 1.0));
        match self.home_ips.get(card) {
            Some(ip) if !change => ip.clone(),
            _ => {
                let ip = random_ip(&mut self.rng);
                self.home_ips.insert(card.to_string(), ip.clone());
                ip
            }
        }
    }

    /// Produce the next transaction and whether it was injected as fraud.
    pub fn next_transaction(&mut self) -> (TransactionEvent, bool) {
        let timestamp = format_timestamp(self.advance_clock());
        let is_fraud = self.rng.gen_bool(self.fraud_probability.clamp(0.0, 1.0));

        let card = self.cards[self.rng.gen_range(0..self.cards.len())].clone();
        let receiver = RECEIVERS[self.rng.gen_range(0..RECEIVERS.len())].to_string();

        let (amount, ip_address) = if is_fraud {
            (
                amount_between(&mut self.rng, FRAUD_MIN_AMOUNT, FRAUD_MAX_AMOUNT),
                random_ip(&mut self.rng),
            )
        } else {
            let amount = amount_between(&mut self.rng, NORMAL_MIN_AMOUNT, NORMAL_MAX_AMOUNT);
            (amount, self.sticky_ip(&card))
        };

        (
            TransactionEvent {
                credit_card_number: card,
                receiver,
                amount,
                ip_address,
                timestamp,
            },
            is_fraud,
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    pub published: u64,
    pub failed: u64,
    pub fraud: u64,
}

/// Publish `count` transactions (forever when `None`), pausing `interval`
/// between them. Publish failures are logged and counted, never fatal.
pub async fn publish_transactions(
    generator: &mut TransactionGenerator,
    publisher: &dyn Publisher,
    count: Option<u64>,
    interval: Duration,
) -> Result<GeneratorStats> {
    let mut stats = GeneratorStats::default();
    let mut sent = 0u64;

    while count.map_or(true, |limit| sent < limit) {
        let (event, is_fraud) = generator.next_transaction();
        if is_fraud {
            stats.fraud += 1;
            let card = &event.credit_card_number;
            tracing::info!(
                card_suffix = &card[card.len().saturating_sub(4)..],
                ip = %event.ip_address,
                amount = event.amount,
                "Injecting fraudulent transaction"
            );
        }

        let message = event.to_message()?;
        tracing::debug!(payload = %String::from_utf8_lossy(&message.data), "Publishing");
        match publisher.publish(message).await {
            Ok(message_id) => {
                stats.published += 1;
                tracing::debug!(message_id = %message_id, "Published transaction");
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!(topic = %publisher.topic(), "Error publishing transaction: {e}");
            }
        }

        sent += 1;
        if !interval.is_zero() && count.map_or(true, |limit| sent < limit) {
            tokio::time::sleep(interval).await;
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::registry::testing::RecordingFactory;
    use crate::pubsub::{PublisherFactory, TopicName};
    use chrono::TimeZone;

    fn seeded(fraud_probability: f64, pool: usize) -> TransactionGenerator {
        TransactionGenerator::new(&GeneratorSettings {
            fraud_probability,
            ip_change_probability: 0.0,
            card_pool_size: pool,
            seed: Some(7),
        })
    }

    #[test]
    fn same_seed_same_sequence() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let settings = GeneratorSettings {
            seed: Some(42),
            card_pool_size: 50,
            ..GeneratorSettings::default()
        };
        let mut a = TransactionGenerator::starting_at(&settings, start);
        let mut b = TransactionGenerator::starting_at(&settings, start);
        for _ in 0..20 {
            assert_eq!(a.next_transaction(), b.next_transaction());
        }
    }

    #[test]
    fn card_numbers_have_expected_shapes() {
        let generator = seeded(0.0, 500);
        for card in generator.cards() {
            assert!(card.chars().all(|c| c.is_ascii_digit()));
            match &card[..4] {
                "4200" | "5500" => assert_eq!(card.len(), 16, "{card}"),
                "3700" => assert_eq!(card.len(), 15, "{card}"),
                other => panic!("unexpected prefix {other}"),
            }
        }
        let amex = generator.cards().iter().filter(|c| c.starts_with("3700")).count();
        assert!(amex > 50 && amex < 150, "amex share off: {amex}");
    }

    #[test]
    fn normal_transactions_use_small_amounts_and_sticky_ip() {
        let mut generator = seeded(0.0, 1);
        let (first, _) = generator.next_transaction();
        for _ in 0..50 {
            let (event, is_fraud) = generator.next_transaction();
            assert!(!is_fraud);
            assert!((NORMAL_MIN_AMOUNT..=NORMAL_MAX_AMOUNT).contains(&event.amount));
            assert_eq!((event.amount * 100.0).round() / 100.0, event.amount);
            assert_eq!(event.ip_address, first.ip_address);
            assert!(RECEIVERS.contains(&event.receiver.as_str()));
        }
    }

    #[test]
    fn fraud_transactions_use_large_amounts() {
        let mut generator = seeded(1.0, 10);
        for _ in 0..50 {
            let (event, is_fraud) = generator.next_transaction();
            assert!(is_fraud);
            assert!((FRAUD_MIN_AMOUNT..=FRAUD_MAX_AMOUNT).contains(&event.amount));
        }
    }

    #[test]
    fn clock_advances_between_one_second_and_one_hour() {
        let start = Utc.with_ymd_and_hms(2025, 9, 18, 11, 0, 0).unwrap();
        let mut generator = TransactionGenerator::starting_at(
            &GeneratorSettings {
                seed: Some(1),
                card_pool_size: 5,
                ..GeneratorSettings::default()
            },
            start,
        );
        let mut previous = start;
        for _ in 0..100 {
            generator.next_transaction();
            let step = generator.clock - previous;
            assert!(step >= ChronoDuration::seconds(1));
            assert!(step <= ChronoDuration::hours(1));
            previous = generator.clock;
        }
    }

    #[test]
    fn default_clock_starts_months_in_the_past() {
        let generator = seeded(0.0, 1);
        let age = Utc::now() - generator.clock;
        assert!(age >= ChronoDuration::minutes(CLOCK_START_OFFSET_MINUTES - 1));
    }

    #[test]
    fn settings_follow_config() {
        let config = GeneratorConfig {
            fraud_probability: 0.5,
            card_pool_size: 3,
            ..GeneratorConfig::default()
        };
        let settings = GeneratorSettings::from_config(&config, Some(9));
        assert_eq!(settings.card_pool_size, 3);
        assert_eq!(settings.seed, Some(9));
        assert_eq!(settings.ip_change_probability, IP_CHANGE_PROBABILITY);
        assert_eq!(TransactionGenerator::new(&settings).cards().len(), 3);
    }

    #[test]
    fn timestamps_drop_zero_millis() {
        let whole = Utc.with_ymd_and_hms(2025, 9, 18, 11, 47, 2).unwrap();
        assert_eq!(format_timestamp(whole), "2025-09-18T11:47:02");
        let with_millis = whole + ChronoDuration::milliseconds(814);
        assert_eq!(format_timestamp(with_millis), "2025-09-18T11:47:02.814");
    }

    #[test]
    fn event_json_matches_agent_input_shape() {
        let event = TransactionEvent {
            credit_card_number: "1234567812345678".into(),
            receiver: "Macy's".into(),
            amount: 100.05,
            ip_address: "68.45.25.58".into(),
            timestamp: "2025-09-18T11:47:02.814".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["credit_card_number"], "1234567812345678");
        assert_eq!(value["amount"], 100.05);
        let message = event.to_message().unwrap();
        assert_eq!(message.ordering_key.as_deref(), Some("1234567812345678"));
    }

    #[tokio::test]
    async fn publish_transactions_orders_by_card() {
        let factory = RecordingFactory::default();
        let topic = TopicName::parse("projects/acme/topics/raw-transactions").unwrap();
        let publisher = factory.create(&topic).unwrap();
        let mut generator = seeded(0.5, 20);

        let stats = publish_transactions(&mut generator, publisher.as_ref(), Some(10), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(stats.published, 10);
        assert_eq!(stats.failed, 0);
        let sent = factory.sent_to("projects/acme/topics/raw-transactions");
        assert_eq!(sent.len(), 10);
        for message in sent {
            let event: TransactionEvent = serde_json::from_slice(&message.data).unwrap();
            assert_eq!(message.ordering_key, Some(event.credit_card_number));
        }
    }

    #[tokio::test]
    async fn publish_failures_are_counted_not_fatal() {
        let factory = RecordingFactory::failing("unavailable");
        let topic = TopicName::parse("projects/acme/topics/raw-transactions").unwrap();
        let publisher = factory.create(&topic).unwrap();
        let mut generator = seeded(0.0, 3);

        let stats = publish_transactions(&mut generator, publisher.as_ref(), Some(3), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(
            stats,
            GeneratorStats {
                published: 0,
                failed: 3,
                fraud: 0,
            }
        );
    }
}
