//! Identifier collection for one (subject, source) pair

use std::time::Instant;

use indicatif::ProgressBar;
use litharvest_core::{CancelToken, RateBudget, RetryPolicy, fmt_num};
use litharvest_entrez::{Catalog, Source, query};

use crate::result::CollectionResult;

/// Collects the full identifier set for a subject from one catalog.
///
/// Owns its own rate budget; each worker builds one collector per source
/// at startup and keeps it for the pool's lifetime, so pacing state never
/// crosses workers.
pub struct IdentifierCollector<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
    source: Source,
    page_size: usize,
    rate: RateBudget,
    retry: RetryPolicy,
}

impl<'a, C: Catalog + ?Sized> IdentifierCollector<'a, C> {
    pub fn new(
        catalog: &'a C,
        source: Source,
        page_size: usize,
        rate: RateBudget,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            catalog,
            source,
            page_size,
            rate,
            retry,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Collect all identifiers for a subject.
    ///
    /// Query variants are tried strictly in order; the first with a
    /// nonzero match count is adopted and paged to exhaustion. Zero
    /// matches everywhere is a successful empty result, distinct from an
    /// infrastructure failure. Cancellation is observed between pages
    /// only; a partial result comes back with `complete=false`.
    pub fn collect(
        &self,
        subject: &str,
        cancel: &CancelToken,
        pb: &ProgressBar,
    ) -> CollectionResult {
        let start = Instant::now();
        let label = format!("{}/{}", self.source, subject);

        // Pick the first variant that matches anything
        let mut adopted: Option<(String, usize)> = None;
        for term in query::search_variants(subject) {
            self.rate.pace();
            match self
                .retry
                .call(&label, || self.catalog.search_count(self.source, &term))
            {
                Ok(0) => continue,
                Ok(count) => {
                    log::debug!("{label}: {} matches for {term:?}", fmt_num(count));
                    adopted = Some((term, count));
                    break;
                }
                Err(e) => {
                    return CollectionResult::failed(
                        subject,
                        self.source,
                        e.to_string(),
                        start.elapsed(),
                    );
                }
            }
        }

        let Some((term, count)) = adopted else {
            log::debug!("{label}: no matches under any variant");
            return CollectionResult::collected(subject, self.source, vec![], true, start.elapsed());
        };

        // Page through the adopted variant
        let mut identifiers = Vec::with_capacity(count);
        let mut retstart = 0;
        while retstart < count {
            if cancel.is_cancelled() {
                log::debug!("{label}: cancelled after {} of {count} ids", identifiers.len());
                return CollectionResult::collected(
                    subject,
                    self.source,
                    identifiers,
                    false,
                    start.elapsed(),
                );
            }

            self.rate.pace();
            let page = match self.retry.call(&label, || {
                self.catalog
                    .search_page(self.source, &term, retstart, self.page_size)
            }) {
                Ok(page) => page,
                Err(e) => {
                    return CollectionResult::failed(
                        subject,
                        self.source,
                        e.to_string(),
                        start.elapsed(),
                    );
                }
            };

            if page.ids.is_empty() {
                // Count drifted under us; what we have is everything
                break;
            }

            identifiers.extend(page.ids.iter().map(|id| self.source.normalize_id(id)));
            retstart += self.page_size;
            pb.set_message(format!(
                "{}: {}/{}",
                self.source,
                fmt_num(identifiers.len()),
                fmt_num(count)
            ));
        }

        CollectionResult::collected(subject, self.source, identifiers, true, start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use litharvest_core::FetchError;
    use litharvest_entrez::SearchPage;

    /// Scripted catalog: per-term match counts, optional failure injection
    struct ScriptedCatalog {
        counts: Vec<(&'static str, usize)>,
        ids: Vec<&'static str>,
        fail_searches: Mutex<usize>,
        cancel_after_first_page: Option<CancelToken>,
    }

    impl ScriptedCatalog {
        fn matching(term_counts: Vec<(&'static str, usize)>, ids: Vec<&'static str>) -> Self {
            Self {
                counts: term_counts,
                ids,
                fail_searches: Mutex::new(0),
                cancel_after_first_page: None,
            }
        }
    }

    impl Catalog for ScriptedCatalog {
        fn search_count(&self, _source: Source, term: &str) -> Result<usize, FetchError> {
            let mut remaining = self.fail_searches.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(FetchError::Http {
                    status: Some(500),
                    message: "scripted failure".into(),
                });
            }
            Ok(self
                .counts
                .iter()
                .find(|(t, _)| *t == term)
                .map_or(0, |(_, c)| *c))
        }

        fn search_page(
            &self,
            _source: Source,
            _term: &str,
            retstart: usize,
            retmax: usize,
        ) -> Result<SearchPage, FetchError> {
            if let Some(token) = &self.cancel_after_first_page {
                token.cancel();
            }
            let ids: Vec<String> = self
                .ids
                .iter()
                .skip(retstart)
                .take(retmax)
                .map(|s| s.to_string())
                .collect();
            Ok(SearchPage {
                count: self.ids.len(),
                ids,
            })
        }

        fn fetch_batch(&self, _source: Source, _ids: &[String]) -> Result<String, FetchError> {
            unreachable!("collection never fetches records")
        }
    }

    fn collector<'a>(
        catalog: &'a ScriptedCatalog,
        source: Source,
        page_size: usize,
    ) -> IdentifierCollector<'a, ScriptedCatalog> {
        IdentifierCollector::new(
            catalog,
            source,
            page_size,
            RateBudget::with_delay(Duration::ZERO),
            RetryPolicy {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn adopts_quoted_variant_first() {
        let catalog = ScriptedCatalog::matching(
            vec![("\"Marfan syndrome\"", 2), ("Marfan syndrome", 50)],
            vec!["10", "11"],
        );
        let result = collector(&catalog, Source::Pubmed, 100).collect(
            "Marfan syndrome",
            &CancelToken::new(),
            &ProgressBar::hidden(),
        );
        assert!(result.success);
        assert_eq!(result.identifiers, vec!["10", "11"]);
    }

    #[test]
    fn falls_back_to_relaxed_variant() {
        let catalog =
            ScriptedCatalog::matching(vec![("Marfan syndrome", 2)], vec!["10", "11"]);
        let result = collector(&catalog, Source::Pubmed, 100).collect(
            "Marfan syndrome",
            &CancelToken::new(),
            &ProgressBar::hidden(),
        );
        assert!(result.success);
        assert_eq!(result.identifiers.len(), 2);
    }

    #[test]
    fn zero_matches_everywhere_is_success_empty() {
        let catalog = ScriptedCatalog::matching(vec![], vec![]);
        let result = collector(&catalog, Source::Pmc, 100).collect(
            "Nonexistent disease",
            &CancelToken::new(),
            &ProgressBar::hidden(),
        );
        assert!(result.success);
        assert!(result.complete);
        assert!(result.identifiers.is_empty());
        assert!(result.error.is_none());
    }

    #[test]
    fn exhausted_retries_is_failure_not_empty_success() {
        let catalog = ScriptedCatalog {
            fail_searches: Mutex::new(99),
            ..ScriptedCatalog::matching(vec![("\"X\"", 1)], vec!["1"])
        };
        let result = collector(&catalog, Source::Pubmed, 100).collect(
            "X",
            &CancelToken::new(),
            &ProgressBar::hidden(),
        );
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn pages_through_all_results() {
        let catalog = ScriptedCatalog::matching(
            vec![("\"X\"", 5)],
            vec!["1", "2", "3", "4", "5"],
        );
        let result = collector(&catalog, Source::Pubmed, 2).collect(
            "X",
            &CancelToken::new(),
            &ProgressBar::hidden(),
        );
        assert!(result.success);
        assert_eq!(result.identifiers, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn pmc_ids_are_normalized() {
        let catalog = ScriptedCatalog::matching(vec![("\"X\"", 2)], vec!["12", "pmc34"]);
        let result = collector(&catalog, Source::Pmc, 100).collect(
            "X",
            &CancelToken::new(),
            &ProgressBar::hidden(),
        );
        assert_eq!(result.identifiers, vec!["PMC12", "PMC34"]);
    }

    #[test]
    fn collecting_twice_yields_identical_sets() {
        let catalog = ScriptedCatalog::matching(vec![("\"X\"", 3)], vec!["1", "2", "3"]);
        let c = collector(&catalog, Source::Pubmed, 2);
        let first = c.collect("X", &CancelToken::new(), &ProgressBar::hidden());
        let second = c.collect("X", &CancelToken::new(), &ProgressBar::hidden());
        assert_eq!(first.identifiers, second.identifiers);
    }

    #[test]
    fn cancellation_between_pages_returns_partial() {
        let token = CancelToken::new();
        let catalog = ScriptedCatalog {
            cancel_after_first_page: Some(token.clone()),
            ..ScriptedCatalog::matching(vec![("\"X\"", 4)], vec!["1", "2", "3", "4"])
        };
        let result =
            collector(&catalog, Source::Pubmed, 2).collect("X", &token, &ProgressBar::hidden());

        assert!(result.success);
        assert!(!result.complete);
        assert_eq!(result.identifiers, vec!["1", "2"]);
    }
}
