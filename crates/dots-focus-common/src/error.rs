use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown week day: {0}")]
    UnknownWeekDay(String),

    #[error("Unknown rule type: {0}")]
    UnknownRuleType(String),

    #[error("Week day index out of range: {0}")]
    WeekDayIndex(u8),
}
