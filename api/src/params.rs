//! Query parameters for the service getters.
//!
//! A request selects its resources with at most one primary [`Selector`]; paging and free-form
//! filters can be added on top of it.
use crate::{
    error::{Error, Result},
    pagination::PageRequest,
    session::MemberId,
};

/// Maximum number of ids the API accepts in a single `id=` list.
pub const MAX_IDS_PER_REQUEST: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Ids(Vec<u64>),
    Id(u64),
    IdForAdvertiser {
        id: u64,
        advertiser_id: u64,
    },
    IdForMember {
        id: u64,
        member_id: MemberId,
    },
    AdvertiserId(u64),
    Search(String),
    AdvertiserCode(String),
    AdvertiserCodeAndCode {
        advertiser_code: String,
        code: String,
    },
    PublisherCode(String),
    PublisherId(u64),
    DeviceType(String),
    Code(String),
    ChangeLog {
        service: String,
        resource_id: u64,
        transaction_id: Option<String>,
    },
    CountryCode(String),
    CountryName(String),
    DmaId(u64),
    DmaName(String),
    Name(String),
}

impl Selector {
    pub fn name(&self) -> &'static str {
        match self {
            Selector::Ids(_) => "ids",
            Selector::Id(_) => "id",
            Selector::IdForAdvertiser { .. } => "id+advertiser_id",
            Selector::IdForMember { .. } => "id+member_id",
            Selector::AdvertiserId(_) => "advertiser_id",
            Selector::Search(_) => "search",
            Selector::AdvertiserCode(_) => "advertiser_code",
            Selector::AdvertiserCodeAndCode { .. } => "advertiser_code+code",
            Selector::PublisherCode(_) => "publisher_code",
            Selector::PublisherId(_) => "publisher_id",
            Selector::DeviceType(_) => "device_type",
            Selector::Code(_) => "code",
            Selector::ChangeLog { .. } => "service+resource_id",
            Selector::CountryCode(_) => "country_code",
            Selector::CountryName(_) => "country_name",
            Selector::DmaId(_) => "dma_id",
            Selector::DmaName(_) => "dma_name",
            Selector::Name(_) => "name",
        }
    }

    fn pairs(&self) -> Result<Vec<(&'static str, String)>> {
        Ok(match self {
            Selector::Ids(ids) => {
                if ids.len() > MAX_IDS_PER_REQUEST {
                    return Err(Error::TooManyIds {
                        count: ids.len(),
                        max: MAX_IDS_PER_REQUEST,
                    });
                }
                vec![("id", id_list(ids))]
            }
            Selector::Id(id) => vec![("id", id.to_string())],
            Selector::IdForAdvertiser { id, advertiser_id } => vec![
                ("id", id.to_string()),
                ("advertiser_id", advertiser_id.to_string()),
            ],
            Selector::IdForMember { id, member_id } => {
                vec![("id", id.to_string()), ("member_id", member_id.to_string())]
            }
            Selector::AdvertiserId(id) => vec![("advertiser_id", id.to_string())],
            Selector::Search(term) => vec![("search", term.clone())],
            Selector::AdvertiserCode(code) => vec![("advertiser_code", code.clone())],
            Selector::AdvertiserCodeAndCode {
                advertiser_code,
                code,
            } => vec![
                ("advertiser_code", advertiser_code.clone()),
                ("code", code.clone()),
            ],
            Selector::PublisherCode(code) => vec![("publisher_code", code.clone())],
            Selector::PublisherId(id) => vec![("publisher_id", id.to_string())],
            Selector::DeviceType(device_type) => vec![("device_type", device_type.clone())],
            Selector::Code(code) => vec![("code", code.clone())],
            Selector::ChangeLog {
                service,
                resource_id,
                transaction_id,
            } => {
                let mut pairs = vec![
                    ("service", service.clone()),
                    ("resource_id", resource_id.to_string()),
                ];
                if let Some(transaction_id) = transaction_id {
                    pairs.push(("transaction_id", transaction_id.clone()));
                }
                pairs
            }
            Selector::CountryCode(code) => vec![("country_code", code.clone())],
            Selector::CountryName(name) => vec![("country_name", name.clone())],
            Selector::DmaId(id) => vec![("dma_id", id.to_string())],
            Selector::DmaName(name) => vec![("dma_name", name.clone())],
            Selector::Name(name) => vec![("name", name.clone())],
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    selector: Option<Selector>,
    start_element: Option<u64>,
    num_elements: Option<u64>,
    filters: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the primary selector. Fails if one was already set.
    pub fn select(mut self, selector: Selector) -> Result<Self> {
        if let Some(existing) = &self.selector {
            return Err(Error::ConflictingSelectors {
                first: existing.name(),
                second: selector.name(),
            });
        }
        self.selector = Some(selector);
        Ok(self)
    }

    pub fn selector(&self) -> Option<&Selector> {
        self.selector.as_ref()
    }

    /// Add a free-form `key=value` parameter.
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push((key.into(), value.into()));
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.start_element = Some(page.start_element);
        self.num_elements = Some(page.num_elements);
        self
    }

    /// Same query with the selector replaced, used when splitting id lists into chunks.
    pub(crate) fn with_selector(&self, selector: Selector) -> Self {
        Self {
            selector: Some(selector),
            ..self.clone()
        }
    }

    pub fn to_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = match &self.selector {
            Some(selector) => selector
                .pairs()?
                .into_iter()
                .map(|(key, value)| (key.to_owned(), value))
                .collect(),
            None => Vec::new(),
        };
        if let Some(start_element) = self.start_element {
            pairs.push(("start_element".to_owned(), start_element.to_string()));
        }
        if let Some(num_elements) = self.num_elements {
            pairs.push(("num_elements".to_owned(), num_elements.to_string()));
        }
        pairs.extend(self.filters.iter().cloned());
        Ok(pairs)
    }
}

impl From<Selector> for Query {
    fn from(selector: Selector) -> Self {
        Self {
            selector: Some(selector),
            ..Default::default()
        }
    }
}

fn id_list(ids: &[u64]) -> String {
    ids.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(query: &Query) -> Vec<(String, String)> {
        query.to_pairs().unwrap()
    }

    fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn test_id_list_is_comma_joined() {
        let query = Query::from(Selector::Ids(vec![1, 22, 333]));
        assert_eq!(pairs(&query), owned(&[("id", "1,22,333")]));
    }

    #[test]
    fn test_second_selector_is_rejected() {
        let error = Query::new()
            .select(Selector::AdvertiserId(1))
            .unwrap()
            .select(Selector::Search("shoes".to_owned()))
            .unwrap_err();
        assert!(matches!(
            error,
            Error::ConflictingSelectors {
                first: "advertiser_id",
                second: "search"
            }
        ));
    }

    #[test]
    fn test_named_parameters_map_to_their_own_keys() {
        assert_eq!(
            pairs(&Selector::CountryName("France".to_owned()).into()),
            owned(&[("country_name", "France")])
        );
        assert_eq!(
            pairs(&Selector::DmaId(501).into()),
            owned(&[("dma_id", "501")])
        );
        assert_eq!(
            pairs(&Selector::DmaName("New York".to_owned()).into()),
            owned(&[("dma_name", "New York")])
        );
    }

    #[test]
    fn test_paging_and_filters_follow_selector() {
        let query = Query::from(Selector::AdvertiserId(7))
            .page(PageRequest {
                start_element: 200,
                num_elements: 100,
            })
            .filter("state", "active");
        assert_eq!(
            pairs(&query),
            owned(&[
                ("advertiser_id", "7"),
                ("start_element", "200"),
                ("num_elements", "100"),
                ("state", "active"),
            ])
        );
    }

    #[test]
    fn test_zero_paging_values_are_sent() {
        let query = Query::new().page(PageRequest {
            start_element: 0,
            num_elements: 0,
        });
        assert_eq!(
            pairs(&query),
            owned(&[("start_element", "0"), ("num_elements", "0")])
        );
    }

    #[test]
    fn test_too_many_ids() {
        let query = Query::from(Selector::Ids((0..101).collect()));
        assert!(matches!(
            query.to_pairs(),
            Err(Error::TooManyIds {
                count: 101,
                max: MAX_IDS_PER_REQUEST
            })
        ));
    }

    #[test]
    fn test_change_log_selector() {
        let query = Query::from(Selector::ChangeLog {
            service: "campaign".to_owned(),
            resource_id: 12,
            transaction_id: Some("abc".to_owned()),
        });
        assert_eq!(
            pairs(&query),
            owned(&[
                ("service", "campaign"),
                ("resource_id", "12"),
                ("transaction_id", "abc")
            ])
        );
    }
}
