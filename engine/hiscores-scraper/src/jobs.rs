//! Work units for the two worker pools and the rank range planning.

use crate::client::{MAX_PAGE, PAGE_SIZE};
use crate::error::{Result, ScrapeError};
use crate::queue::Prioritized;

/// Highest rank the leaderboard can serve
pub const MAX_RANK: u64 = MAX_PAGE as u64 * PAGE_SIZE as u64;

/// A ranking page plus the slice `[startind, endind)` of its rows to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    pub pagenum: u32,
    pub startind: usize,
    pub endind: usize,
}

impl PageJob {
    /// Rank of the row at `offset` on this page
    pub fn rank_at(&self, offset: usize) -> u64 {
        (self.pagenum as u64 - 1) * PAGE_SIZE as u64 + offset as u64 + 1
    }

    pub fn first_rank(&self) -> u64 {
        self.rank_at(self.startind)
    }

    pub fn last_rank(&self) -> u64 {
        self.rank_at(self.endind - 1)
    }
}

impl Prioritized for PageJob {
    fn priority(&self) -> u64 {
        self.pagenum as u64
    }
}

/// A username to fetch, prioritized by its leaderboard rank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsernameJob {
    pub rank: u64,
    pub username: String,
}

impl Prioritized for UsernameJob {
    fn priority(&self) -> u64 {
        self.rank
    }
}

fn page_of(rank: u64) -> (u32, usize) {
    let zero = rank - 1;
    ((zero / PAGE_SIZE as u64) as u32 + 1, (zero % PAGE_SIZE as u64) as usize)
}

/// Page jobs covering ranks `start_rank..=stop_rank` in ascending order
pub fn plan_page_jobs(start_rank: u64, stop_rank: u64) -> Result<Vec<PageJob>> {
    if start_rank == 0 || stop_rank < start_rank || stop_rank > MAX_RANK {
        return Err(ScrapeError::InvalidRange { start: start_rank, stop: stop_rank });
    }
    let (first_page, first_offset) = page_of(start_rank);
    let (last_page, last_offset) = page_of(stop_rank);

    Ok((first_page..=last_page)
        .map(|pagenum| PageJob {
            pagenum,
            startind: if pagenum == first_page { first_offset } else { 0 },
            endind: if pagenum == last_page { last_offset + 1 } else { PAGE_SIZE },
        })
        .collect())
}

/// Drop the work already exported up to `last_rank`, trimming the first
/// surviving page so it starts right after it
pub fn resume_page_jobs(jobs: Vec<PageJob>, last_rank: Option<u64>) -> Vec<PageJob> {
    let Some(last_rank) = last_rank else {
        return jobs;
    };
    jobs.into_iter()
        .filter(|job| job.last_rank() > last_rank)
        .map(|mut job| {
            if job.first_rank() <= last_rank {
                job.startind = page_of(last_rank + 1).1;
            }
            job
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_partial_pages() {
        let jobs = plan_page_jobs(30, 80).unwrap();
        assert_eq!(
            jobs,
            vec![
                PageJob { pagenum: 2, startind: 4, endind: 25 },
                PageJob { pagenum: 3, startind: 0, endind: 25 },
                PageJob { pagenum: 4, startind: 0, endind: 5 },
            ]
        );
        assert_eq!(jobs[0].first_rank(), 30);
        assert_eq!(jobs[2].last_rank(), 80);
    }

    #[test]
    fn test_plan_single_page() {
        let jobs = plan_page_jobs(1, 25).unwrap();
        assert_eq!(jobs, vec![PageJob { pagenum: 1, startind: 0, endind: 25 }]);
    }

    #[test]
    fn test_plan_rejects_bad_ranges() {
        assert!(plan_page_jobs(0, 10).is_err());
        assert!(plan_page_jobs(10, 9).is_err());
        assert!(plan_page_jobs(1, MAX_RANK + 1).is_err());
        assert!(plan_page_jobs(MAX_RANK, MAX_RANK).is_ok());
    }

    #[test]
    fn test_resume_trims_first_page() {
        let jobs = resume_page_jobs(plan_page_jobs(1, 200).unwrap(), Some(137));
        assert_eq!(jobs[0], PageJob { pagenum: 6, startind: 12, endind: 25 });
        assert_eq!(jobs[0].first_rank(), 138);
        assert_eq!(jobs.last().unwrap().last_rank(), 200);
        assert_eq!(jobs.len(), 3);
    }

    #[test]
    fn test_resume_on_page_boundary_and_completion() {
        let jobs = resume_page_jobs(plan_page_jobs(1, 100).unwrap(), Some(50));
        assert_eq!(jobs[0], PageJob { pagenum: 3, startind: 0, endind: 25 });

        assert!(resume_page_jobs(plan_page_jobs(1, 100).unwrap(), Some(100)).is_empty());
        assert!(resume_page_jobs(plan_page_jobs(1, 100).unwrap(), Some(150)).is_empty());
        assert_eq!(resume_page_jobs(plan_page_jobs(1, 100).unwrap(), None).len(), 4);
    }
}
