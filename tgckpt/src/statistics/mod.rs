use std::{fmt::Display, time::Duration};

pub mod counter;

#[macro_export]
macro_rules! statistics_list {
    ($($name:ident = $value:expr),* $(,)?) => {
        vec![
            $(
                (::std::stringify!($name), $crate::statistics::StatValue::from($value))
            ),*
        ]
    };
}

/// A single reported value. Elapsed times are printed in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Count(u64),
    Elapsed(Duration),
}

impl From<u64> for StatValue {
    fn from(value: u64) -> Self {
        StatValue::Count(value)
    }
}

impl From<Duration> for StatValue {
    fn from(value: Duration) -> Self {
        StatValue::Elapsed(value)
    }
}

impl Display for StatValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatValue::Count(n) => write!(f, "{n}"),
            StatValue::Elapsed(d) => write!(f, "{}", d.as_secs_f64()),
        }
    }
}

pub trait StatisticsProvider {
    fn class_name(&self) -> &'static str;

    fn statistics(&self) -> Vec<(&'static str, StatValue)>;
}

pub fn as_text(provider: &dyn StatisticsProvider) -> String {
    provider
        .statistics()
        .iter()
        .map(|(k, v)| format!("{}.{k}={v}", provider.class_name()))
        .collect::<Vec<String>>()
        .join("\n")
}
