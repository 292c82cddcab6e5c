use log::{debug, info};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Default page size, also the largest the API will serve.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Default number of ids per bulk request.
pub const DEFAULT_CHUNK_SIZE: usize = crate::params::MAX_IDS_PER_REQUEST;

/// Identifier to name mapping, as extracted from service responses.
pub type Names = BTreeMap<u64, Option<String>>;

/// A partial result which can be combined with the next one.
pub trait ReducibleResponse {
    fn merge(self, other: Self) -> Self;

    fn empty() -> Self;
}

impl<K: Ord, V> ReducibleResponse for BTreeMap<K, V> {
    fn merge(mut self, other: Self) -> Self {
        self.extend(other);
        self
    }

    fn empty() -> Self {
        BTreeMap::new()
    }
}

impl<T> ReducibleResponse for Vec<T> {
    fn merge(mut self, other: Self) -> Self {
        self.extend(other);
        self
    }

    fn empty() -> Self {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub start_element: u64,
    pub num_elements: u64,
}

/// One page of results with the total number of elements the server reported, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub count: Option<u64>,
    pub items: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOptions {
    pub page_size: u64,
    /// Maximum number of page calls. The result is partial when it is reached.
    pub limit: Option<u64>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            limit: None,
        }
    }
}

/// Fetch every page of a listing and merge the pages together.
///
/// A first call for zero elements learns the total `count`, then `ceil(count / page_size)` pages
/// are requested in order. Errors from `fetch_page` are propagated as is.
pub fn fetch_all<T, F>(mut fetch_page: F, options: PageOptions) -> Result<T>
where
    T: ReducibleResponse,
    F: FnMut(PageRequest) -> Result<Page<T>>,
{
    let PageOptions { page_size, limit } = options;
    if page_size == 0 {
        return Err(Error::BadPageSize);
    }

    let count = fetch_page(PageRequest {
        start_element: 0,
        num_elements: 0,
    })?
    .count
    .ok_or_else(|| Error::BadResponse {
        message: "`count` missing from paged response".to_owned(),
    })?;
    info!("{count} elements found");

    let total_pages = count.div_ceil(page_size);
    let mut results = T::empty();
    for i_page in 0..total_pages {
        if let Some(limit) = limit {
            if i_page >= limit {
                info!("{i_page}/{limit} calls made, stopping early");
                break;
            }
        }
        debug!("Fetching page {}/{}", i_page + 1, total_pages);
        let page = fetch_page(PageRequest {
            start_element: i_page * page_size,
            num_elements: page_size,
        })?;
        results = results.merge(page.items);
    }
    Ok(results)
}

/// Split `ids` into consecutive chunks of `chunk_size` and fetch each chunk in order.
///
/// The first failing chunk aborts the whole operation.
pub fn bulk_fetch<I, T, F>(ids: &[I], chunk_size: usize, mut fetch: F) -> Result<T>
where
    T: ReducibleResponse,
    F: FnMut(&[I]) -> Result<T>,
{
    if chunk_size == 0 {
        return Err(Error::BadPageSize);
    }
    let num_chunks = ids.len().div_ceil(chunk_size);
    ids.chunks(chunk_size)
        .enumerate()
        .try_fold(T::empty(), |merged, (i_chunk, chunk)| {
            debug!(
                "Fetching chunk {}/{} ({} ids)",
                i_chunk + 1,
                num_chunks,
                chunk.len()
            );
            Ok(merged.merge(fetch(chunk)?))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// A listing of `count` elements, named after their index.
    fn listing(count: u64, request: PageRequest) -> Page<Names> {
        let end = (request.start_element + request.num_elements).min(count);
        Page {
            count: Some(count),
            items: (request.start_element..end)
                .map(|id| (id, Some(format!("name-{id}"))))
                .collect(),
        }
    }

    #[test]
    fn test_fetch_all_issues_one_call_per_page() {
        for (count, page_size) in [(0, 100), (1, 100), (100, 100), (101, 100), (950, 100), (7, 3)]
        {
            let mut requests = Vec::new();
            let names: Names = fetch_all(
                |request| {
                    requests.push(request);
                    Ok(listing(count, request))
                },
                PageOptions {
                    page_size,
                    limit: None,
                },
            )
            .unwrap();

            let page_calls: Vec<_> = requests.iter().skip(1).collect();
            assert_eq!(page_calls.len() as u64, count.div_ceil(page_size));
            assert_eq!(names.len() as u64, count);
            assert_eq!(
                requests[0],
                PageRequest {
                    start_element: 0,
                    num_elements: 0
                }
            );
            for (i_page, request) in page_calls.iter().enumerate() {
                assert_eq!(request.start_element, i_page as u64 * page_size);
                assert_eq!(request.num_elements, page_size);
            }
        }
    }

    #[test]
    fn test_fetch_all_stops_at_limit() {
        let mut calls = 0;
        let names: Names = fetch_all(
            |request| {
                calls += 1;
                Ok(listing(1000, request))
            },
            PageOptions {
                page_size: 100,
                limit: Some(3),
            },
        )
        .unwrap();
        assert_eq!(calls, 4);
        assert_eq!(names.len(), 300);
        assert_eq!(names.keys().next_back(), Some(&299));
    }

    #[test]
    fn test_fetch_all_concatenates_lists() {
        let pages: Vec<u64> = fetch_all(
            |request| {
                Ok(Page {
                    count: Some(250),
                    items: vec![request.start_element],
                })
            },
            PageOptions::default(),
        )
        .unwrap();
        assert_eq!(pages, vec![0, 100, 200]);
    }

    #[test]
    fn test_fetch_all_propagates_page_errors() {
        let result: Result<Names> = fetch_all(
            |request| {
                if request.start_element == 100 {
                    Err(Error::InvalidLogin)
                } else {
                    Ok(listing(300, request))
                }
            },
            PageOptions::default(),
        );
        assert!(matches!(result, Err(Error::InvalidLogin)));
    }

    #[test]
    fn test_fetch_all_requires_count() {
        let result: Result<Names> = fetch_all(
            |_| {
                Ok(Page {
                    count: None,
                    items: Names::new(),
                })
            },
            PageOptions::default(),
        );
        assert!(matches!(result, Err(Error::BadResponse { .. })));
    }

    #[test]
    fn test_bulk_fetch_chunks_and_merges() {
        for num_ids in [0usize, 1, 99, 100, 101, 250] {
            let ids: Vec<u64> = (0..num_ids as u64).collect();
            let mut chunk_lengths = Vec::new();
            let names: Names = bulk_fetch(&ids, 100, |chunk| {
                chunk_lengths.push(chunk.len());
                Ok(chunk.iter().map(|id| (*id, Some(id.to_string()))).collect())
            })
            .unwrap();

            let unchunked: Names = ids.iter().map(|id| (*id, Some(id.to_string()))).collect();
            assert_eq!(chunk_lengths.len(), num_ids.div_ceil(100));
            assert!(chunk_lengths.iter().all(|length| *length <= 100));
            assert_eq!(names, unchunked);
        }
    }

    #[test]
    fn test_bulk_fetch_aborts_on_failure() {
        let ids: Vec<u64> = (0..300).collect();
        let mut calls = 0;
        let result: Result<Vec<u64>> = bulk_fetch(&ids, 100, |chunk| {
            calls += 1;
            if chunk[0] == 100 {
                Err(Error::NoTransactionData)
            } else {
                Ok(chunk.to_vec())
            }
        });
        assert!(matches!(result, Err(Error::NoTransactionData)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_zero_sizes_are_rejected() {
        let result: Result<Vec<u64>> = bulk_fetch(&[1u64], 0, |chunk| Ok(chunk.to_vec()));
        assert!(matches!(result, Err(Error::BadPageSize)));

        let result: Result<Names> = fetch_all(
            |request| Ok(listing(10, request)),
            PageOptions {
                page_size: 0,
                limit: None,
            },
        );
        assert!(matches!(result, Err(Error::BadPageSize)));
    }
}
