// src/gate.rs

use chrono::{Datelike, NaiveDate};

/// Decides, from the current date alone, whether a sync should run.
pub trait Trigger {
    fn should_run(&self, today: NaiveDate) -> bool;
}

impl<F> Trigger for F
where
    F: Fn(NaiveDate) -> bool,
{
    fn should_run(&self, today: NaiveDate) -> bool {
        self(today)
    }
}

/// Open on one day of every month.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DayOfMonth(pub u32);

impl Trigger for DayOfMonth {
    fn should_run(&self, today: NaiveDate) -> bool {
        today.day() == self.0
    }
}

/// Always open.
#[derive(Clone, Copy, Debug, Default)]
pub struct Always;

impl Trigger for Always {
    fn should_run(&self, _today: NaiveDate) -> bool {
        true
    }
}
