use chrono::{Datelike, NaiveDate, Utc};

/// The (year, semester) pair that scopes which group enrollments count.
///
/// Derived from the wall clock, never stored. `year` is the starting
/// calendar year of the academic year: September through August.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcademicPeriod {
    pub year: i32,
    pub semester: i32,
}

impl AcademicPeriod {
    /// Derive the academic period from a calendar date.
    ///
    /// September–January is semester 1, February–August is semester 2.
    /// January still belongs to the academic year that started the previous
    /// September.
    pub fn from_date(date: NaiveDate) -> Self {
        let year = date.year();
        match date.month() {
            9..=12 => Self { year, semester: 1 },
            1 => Self {
                year: year - 1,
                semester: 1,
            },
            _ => Self {
                year: year - 1,
                semester: 2,
            },
        }
    }

    /// The period in effect right now. Handlers call this; tests pin dates
    /// through [`AcademicPeriod::from_date`] instead.
    pub fn current() -> Self {
        Self::from_date(Utc::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn autumn_is_first_semester() {
        assert_eq!(
            AcademicPeriod::from_date(date(2025, 9, 1)),
            AcademicPeriod {
                year: 2025,
                semester: 1
            }
        );
        assert_eq!(
            AcademicPeriod::from_date(date(2025, 12, 31)),
            AcademicPeriod {
                year: 2025,
                semester: 1
            }
        );
    }

    #[test]
    fn january_belongs_to_previous_academic_year() {
        assert_eq!(
            AcademicPeriod::from_date(date(2026, 1, 15)),
            AcademicPeriod {
                year: 2025,
                semester: 1
            }
        );
    }

    #[test]
    fn spring_is_second_semester() {
        assert_eq!(
            AcademicPeriod::from_date(date(2026, 2, 1)),
            AcademicPeriod {
                year: 2025,
                semester: 2
            }
        );
        assert_eq!(
            AcademicPeriod::from_date(date(2026, 8, 31)),
            AcademicPeriod {
                year: 2025,
                semester: 2
            }
        );
    }
}
