//! Ordered collection of shows
//!
//! Shows are kept sorted by start time. Windows may leave gaps (idle
//! periods); when windows overlap, the show that comes first in schedule
//! order wins.

use crate::error::{Result, ScheduleError};
use crate::show::Show;
use chrono::NaiveTime;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    shows: Vec<Show>,
}

impl Schedule {
    /// Builds a schedule, ordering shows by start time (stable for equal starts).
    pub fn new(mut shows: Vec<Show>) -> Result<Self> {
        let mut seen = HashSet::new();
        for show in &shows {
            if !seen.insert(show.id) {
                return Err(ScheduleError::DuplicateId(show.id));
            }
        }
        shows.sort_by_key(|show| show.start);
        Ok(Self { shows })
    }

    pub fn len(&self) -> usize {
        self.shows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }

    pub fn shows(&self) -> &[Show] {
        &self.shows
    }

    pub fn get(&self, index: usize) -> Option<&Show> {
        self.shows.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Show> {
        self.shows.get_mut(index)
    }

    pub fn position(&self, id: u32) -> Option<usize> {
        self.shows.iter().position(|show| show.id == id)
    }

    /// Index of the first show, in schedule order, whose window contains `time`
    pub fn current_index(&self, time: NaiveTime) -> Option<usize> {
        self.shows.iter().position(|show| show.contains(time))
    }

    /// First show, in schedule order, whose window contains `time`
    pub fn find_current(&self, time: NaiveTime) -> Option<&Show> {
        self.current_index(time).map(|i| &self.shows[i])
    }

    /// Show with the earliest start
    pub fn find_first(&self) -> Option<&Show> {
        self.shows.first()
    }

    /// Show with the latest end
    pub fn find_last(&self) -> Option<&Show> {
        self.last_index().map(|i| &self.shows[i])
    }

    /// Index of the show with the latest end (earliest in order on ties)
    pub fn last_index(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, show) in self.shows.iter().enumerate() {
            match best {
                Some(b) if self.shows[b].end >= show.end => {}
                _ => best = Some(i),
            }
        }
        best
    }

    /// Index of the show following `index`, wrapping to the first one
    pub fn next_index(&self, index: usize) -> Option<usize> {
        if self.shows.is_empty() {
            return None;
        }
        Some((index + 1) % self.shows.len())
    }

    /// Show following `show` in schedule order, wrapping to the first one
    pub fn find_next(&self, show: &Show) -> Option<&Show> {
        let index = self.position(show.id)?;
        self.next_index(index).map(|i| &self.shows[i])
    }

    /// Next show to open after `time`: the first whose start is later than
    /// `time`, or the first show of the following day.
    pub fn find_upcoming(&self, time: NaiveTime) -> Option<&Show> {
        self.shows
            .iter()
            .find(|show| show.start > time)
            .or_else(|| self.shows.first())
    }

    /// Clears every show's airing state
    pub fn reset(&mut self) {
        for show in &mut self.shows {
            show.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn sample() -> Schedule {
        Schedule::new(vec![
            Show::parse(2, "B", "10:00", "12:00").unwrap(),
            Show::parse(1, "A", "05:30", "10:00").unwrap(),
            Show::parse(3, "C", "18:00", "20:00").unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_shows_are_ordered_by_start() {
        let schedule = sample();
        let titles: Vec<_> = schedule.shows().iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let err = Schedule::new(vec![
            Show::parse(1, "A", "05:30", "10:00").unwrap(),
            Show::parse(1, "B", "10:00", "12:00").unwrap(),
        ])
        .unwrap_err();
        assert_eq!(err, ScheduleError::DuplicateId(1));
    }

    #[test]
    fn test_find_current_prefers_earlier_show_on_overlap() {
        let schedule = sample();
        // 10:00 is inside both A (closed end) and B (closed start)
        assert_eq!(schedule.find_current(t(10, 0)).unwrap().title, "A");
        assert_eq!(schedule.find_current(t(10, 1)).unwrap().title, "B");
        assert!(schedule.find_current(t(14, 0)).is_none());
    }

    #[test]
    fn test_first_last_next() {
        let schedule = sample();
        assert_eq!(schedule.find_first().unwrap().title, "A");
        assert_eq!(schedule.find_last().unwrap().title, "C");

        let a = schedule.find_first().unwrap().clone();
        let b = schedule.find_next(&a).unwrap().clone();
        assert_eq!(b.title, "B");
        let c = schedule.find_next(&b).unwrap().clone();
        assert_eq!(c.title, "C");
        assert_eq!(schedule.find_next(&c).unwrap().title, "A");
    }

    #[test]
    fn test_empty_schedule() {
        let schedule = Schedule::default();
        assert!(schedule.find_first().is_none());
        assert!(schedule.find_last().is_none());
        assert!(schedule.find_current(t(8, 0)).is_none());
        assert!(schedule.next_index(0).is_none());
        assert!(schedule.find_upcoming(t(8, 0)).is_none());
        let orphan = Show::parse(9, "Z", "01:00", "02:00").unwrap();
        assert!(schedule.find_next(&orphan).is_none());
    }

    #[test]
    fn test_find_upcoming_wraps_to_first() {
        let schedule = sample();
        assert_eq!(schedule.find_upcoming(t(4, 0)).unwrap().title, "A");
        assert_eq!(schedule.find_upcoming(t(12, 30)).unwrap().title, "C");
        assert_eq!(schedule.find_upcoming(t(21, 0)).unwrap().title, "A");
    }
}
