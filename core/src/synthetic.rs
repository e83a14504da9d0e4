//! Synthetic population: seeded customers and transaction traffic for
//! the runner and the determinism suite.
//!
//! RULE: Every draw comes from an RngBank stream. Same seed and config
//! produce byte-identical customers, transactions and histories.

use crate::{
    model::{
        Address, Customer, Identification, IdentificationType, Transaction, TransactionParty,
        TransferType,
    },
    name_generator::NameGenerator,
    rng::{RngBank, StreamRng, StreamSlot},
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const DOMESTIC_COUNTRIES: &[&str] = &["US", "GB", "DE", "FR", "CA", "JP", "SG", "AU"];
const CURRENCIES: &[&str] = &["USD", "EUR", "GBP"];
const BENIGN_DESCRIPTIONS: &[&str] = &[
    "Invoice payment", "Monthly rent", "Payroll", "Utilities", "Supplier settlement",
    "Consulting fee", "Refund", "Subscription",
];
const RISKY_DESCRIPTIONS: &[&str] = &[
    "cash urgent offshore", "anonymous transfer", "crypto purchase", "secret bonus in cash",
];
const SANCTIONED_NAMES: &[&str] = &["John Restricted", "Restricted Entity Alpha"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub customers: usize,
    /// Share of transactions drawn from the risky profile.
    pub risky_share: f64,
    /// Share of transactions whose counterparty is on the default watchlist.
    pub sanctioned_share: f64,
    pub high_risk_countries: Vec<String>,
    /// First transaction timestamp; later ones follow at one-minute steps.
    pub start: DateTime<Utc>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            customers: 50,
            risky_share: 0.15,
            sanctioned_share: 0.02,
            high_risk_countries: vec!["KP".into(), "IR".into(), "SY".into()],
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default(),
        }
    }
}

/// One check's worth of input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticCase {
    pub transaction: Transaction,
    pub customer: Customer,
    pub history: Vec<Transaction>,
}

pub struct SyntheticPopulation {
    config:    PopulationConfig,
    customers: Vec<Customer>,
    tx_rng:    StreamRng,
    hist_rng:  StreamRng,
    risk_rng:  StreamRng,
    next_tx:   u64,
}

impl SyntheticPopulation {
    pub fn new(seed: u64, config: PopulationConfig) -> Self {
        let bank = RngBank::new(seed);
        let mut cust_rng = bank.for_stream(StreamSlot::Customers);
        let customers = (0..config.customers.max(1))
            .map(|i| generate_customer(i, config.start, &mut cust_rng))
            .collect();
        log::debug!("synthetic population seeded with {} customers (seed {seed})", config.customers);
        Self {
            customers,
            tx_rng: bank.for_stream(StreamSlot::Transactions),
            hist_rng: bank.for_stream(StreamSlot::History),
            risk_rng: bank.for_stream(StreamSlot::Risk),
            next_tx: 0,
            config,
        }
    }

    pub fn customers(&self) -> &[Customer] {
        &self.customers
    }

    pub fn generate_cases(&mut self, count: usize) -> Vec<SyntheticCase> {
        (0..count).map(|_| self.next_case()).collect()
    }

    pub fn next_case(&mut self) -> SyntheticCase {
        let seq = self.next_tx;
        self.next_tx += 1;
        let timestamp = self.config.start + Duration::minutes(seq as i64);

        let idx = self.tx_rng.next_u64_below(self.customers.len() as u64) as usize;
        let mut customer = self.customers[idx].clone();
        let risky = self.risk_rng.chance(self.config.risky_share);
        let sanctioned = self.risk_rng.chance(self.config.sanctioned_share);

        let home = customer
            .address
            .as_ref()
            .map(|a| a.country.clone())
            .unwrap_or_else(|| "US".to_string());
        let mut sender = TransactionParty::new(customer.name.clone(), format!("acct-{}", customer.id))
            .in_country(home.clone());
        let receiver_name = NameGenerator::generate_business_name(&mut self.tx_rng);
        let receiver_account = format!("acct-ext-{:04}", self.tx_rng.next_u64_below(10_000));
        let mut receiver = TransactionParty::new(receiver_name, receiver_account);

        let (amount, description) = if risky {
            let country = self
                .risk_rng
                .pick(&self.config.high_risk_countries)
                .cloned()
                .unwrap_or_else(|| home.clone());
            receiver = receiver.in_country(country);
            let cents = self.risk_rng.range_i64(50_000_00, 250_000_00);
            let desc = self.risk_rng.pick(RISKY_DESCRIPTIONS).copied().unwrap_or("cash");
            (Decimal::new(cents, 2), desc.to_string())
        } else {
            let country = if self.tx_rng.chance(0.8) {
                home.clone()
            } else {
                self.tx_rng.pick(DOMESTIC_COUNTRIES).copied().unwrap_or("US").to_string()
            };
            receiver = receiver.in_country(country);
            let cents = self.tx_rng.range_i64(10_00, 8_000_00);
            let desc = self.tx_rng.pick(BENIGN_DESCRIPTIONS).copied().unwrap_or("Payment");
            (Decimal::new(cents, 2), desc.to_string())
        };

        if sanctioned {
            let name = self.risk_rng.pick(SANCTIONED_NAMES).copied().unwrap_or("John Restricted");
            if self.risk_rng.chance(0.5) {
                receiver.name = name.to_string();
            } else {
                customer.name = name.to_string();
                sender.name = name.to_string();
            }
        }

        let transaction = Transaction {
            id: format!("tx-{seq:06}"),
            amount,
            currency: self.tx_rng.pick(CURRENCIES).copied().unwrap_or("USD").to_string(),
            sender,
            receiver,
            description: Some(description),
            timestamp,
            transfer_type: TransferType::Transfer,
        };
        let history = self.generate_history(&transaction, &customer);
        SyntheticCase { transaction, customer, history }
    }

    /// Earlier transactions by the same sender, all before `tx`.
    fn generate_history(&mut self, tx: &Transaction, customer: &Customer) -> Vec<Transaction> {
        let n = self.hist_rng.range_i64(0, 12);
        (0..n)
            .filter_map(|i| {
                let back = Duration::minutes(self.hist_rng.range_i64(5, 60 * 72));
                let timestamp = tx.timestamp - back;
                if timestamp < customer.account_created_at {
                    return None;
                }
                let cents = self.hist_rng.range_i64(10_00, 9_000_00);
                Some(Transaction {
                    id: format!("{}-h{i:02}", tx.id),
                    amount: Decimal::new(cents, 2),
                    currency: tx.currency.clone(),
                    sender: tx.sender.clone(),
                    receiver: tx.receiver.clone(),
                    description: Some("Earlier payment".to_string()),
                    timestamp,
                    transfer_type: TransferType::Transfer,
                })
            })
            .collect()
    }
}

fn generate_customer(i: usize, start: DateTime<Utc>, rng: &mut StreamRng) -> Customer {
    let age_days = rng.range_i64(0, 3_650);
    let country = rng.pick(DOMESTIC_COUNTRIES).copied().unwrap_or("US").to_string();
    let documented = rng.chance(0.85);
    let dob = NaiveDate::from_ymd_opt(1950, 1, 1)
        .map(|base| base + Duration::days(rng.range_i64(0, 18_000)));

    Customer {
        id: format!("cust-{i:05}"),
        name: NameGenerator::generate_full_name(rng),
        date_of_birth: dob,
        nationality: Some(country.clone()),
        address: documented.then(|| Address {
            street: None,
            city: None,
            state: None,
            postal_code: None,
            country: country.clone(),
        }),
        identification: documented.then(|| Identification {
            id_type: IdentificationType::Passport,
            number: format!("P{:07}", i),
            issuing_country: country.clone(),
            expiry_date: None,
        }),
        account_created_at: start - Duration::days(age_days) - Duration::hours(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_cases() {
        let mut a = SyntheticPopulation::new(99, PopulationConfig::default());
        let mut b = SyntheticPopulation::new(99, PopulationConfig::default());
        assert_eq!(a.generate_cases(25), b.generate_cases(25));
    }

    #[test]
    fn history_precedes_transaction_and_account_opening_precedes_history() {
        let mut pop = SyntheticPopulation::new(5, PopulationConfig::default());
        for case in pop.generate_cases(50) {
            assert!(case.customer.account_created_at <= case.transaction.timestamp);
            for h in &case.history {
                assert!(h.timestamp < case.transaction.timestamp);
                assert!(h.timestamp >= case.customer.account_created_at);
            }
        }
    }
}
