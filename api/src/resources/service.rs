use serde_json::Value;
use std::{fmt, str::FromStr};

use crate::{
    error::{Error, Result},
    pagination::{bulk_fetch, fetch_all, Names, Page, PageOptions, DEFAULT_CHUNK_SIZE},
    params::{Query, Selector},
    resources::names_from_response,
    Client,
};

/// The console services the client knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {
    Campaign,
    Pixel,
    DeviceModel,
    Advertiser,
    LineItem,
    InsertionOrder,
    Segment,
    Publisher,
    InventoryResold,
    Creative,
    OperatingSystem,
    OperatingSystemExtended,
    ChangeLog,
    ChangeLogDetail,
    Country,
    City,
    Browser,
}

impl Service {
    pub const ALL: [Service; 17] = [
        Service::Campaign,
        Service::Pixel,
        Service::DeviceModel,
        Service::Advertiser,
        Service::LineItem,
        Service::InsertionOrder,
        Service::Segment,
        Service::Publisher,
        Service::InventoryResold,
        Service::Creative,
        Service::OperatingSystem,
        Service::OperatingSystemExtended,
        Service::ChangeLog,
        Service::ChangeLogDetail,
        Service::Country,
        Service::City,
        Service::Browser,
    ];

    /// Path of the service, relative to the API endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Service::Campaign => "campaign",
            Service::Pixel => "pixel",
            Service::DeviceModel => "device-model",
            Service::Advertiser => "advertiser",
            Service::LineItem => "line-item",
            Service::InsertionOrder => "insertion-order",
            Service::Segment => "segment",
            Service::Publisher => "publisher",
            Service::InventoryResold => "inventory-resold",
            Service::Creative => "creative",
            Service::OperatingSystem => "operating-system",
            Service::OperatingSystemExtended => "operating-system-extended",
            Service::ChangeLog => "change-log",
            Service::ChangeLogDetail => "change-log-detail",
            Service::Country => "country",
            Service::City => "city",
            Service::Browser => "browser",
        }
    }

    /// Key under which responses of this service return a single object.
    pub fn names_key(self) -> &'static str {
        match self {
            Service::DeviceModel => "device_model",
            Service::LineItem => "line_item",
            Service::InsertionOrder => "insertion_order",
            Service::InventoryResold => "inventory_resold",
            Service::OperatingSystem => "operating_system",
            Service::OperatingSystemExtended => "operating_system_extended",
            Service::ChangeLog => "change_log",
            Service::ChangeLogDetail => "change_log_detail",
            other => other.path(),
        }
    }

    /// Key under which responses of this service list their objects.
    pub fn plural_key(self) -> &'static str {
        match self {
            Service::Campaign => "campaigns",
            Service::Pixel => "pixels",
            Service::DeviceModel => "device_models",
            Service::Advertiser => "advertisers",
            Service::LineItem => "line_items",
            Service::InsertionOrder => "insertion_orders",
            Service::Segment => "segments",
            Service::Publisher => "publishers",
            Service::InventoryResold => "inventory_resolds",
            Service::Creative => "creatives",
            Service::OperatingSystem => "operating_systems",
            Service::OperatingSystemExtended => "operating_systems_extended",
            Service::ChangeLog => "change_logs",
            Service::ChangeLogDetail => "change_log_details",
            Service::Country => "countries",
            Service::City => "cities",
            Service::Browser => "browsers",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Service {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        let normalised = string.trim().to_lowercase().replace('_', "-");
        Service::ALL
            .into_iter()
            .find(|service| service.path() == normalised)
            .ok_or_else(|| Error::UnknownService {
                name: string.to_owned(),
            })
    }
}

impl Client {
    /// Raw response of a single GET on `service`.
    pub fn get_service(&self, service: Service, query: &Query) -> Result<Value> {
        self.get(self.endpoints().service(service)?, query)
    }

    pub fn get_names(&self, service: Service, query: &Query) -> Result<Names> {
        let response = self.get_service(service, query)?;
        Ok(names_from_response(&response, service.plural_key(), service.names_key()))
    }

    /// Names of every object matching `query`, walking through all the pages.
    pub fn get_all_names(
        &self,
        service: Service,
        query: &Query,
        options: PageOptions,
    ) -> Result<Names> {
        fetch_all(
            |page| {
                let response = self.get_service(service, &query.clone().page(page))?;
                Ok(Page {
                    count: response.get("count").and_then(Value::as_u64),
                    items: names_from_response(&response, service.plural_key(), service.names_key()),
                })
            },
            options,
        )
    }

    /// Raw responses of every page matching `query`.
    pub fn get_all_pages(
        &self,
        service: Service,
        query: &Query,
        options: PageOptions,
    ) -> Result<Vec<Value>> {
        fetch_all(
            |page| {
                let response = self.get_service(service, &query.clone().page(page))?;
                Ok(Page {
                    count: response.get("count").and_then(Value::as_u64),
                    items: vec![response],
                })
            },
            options,
        )
    }

    /// Names for an arbitrary number of ids, requested in chunks the API accepts.
    pub fn bulk_get_names(&self, service: Service, ids: &[u64], query: &Query) -> Result<Names> {
        bulk_fetch(ids, DEFAULT_CHUNK_SIZE, |chunk| {
            self.get_names(service, &query.with_selector(Selector::Ids(chunk.to_vec())))
        })
    }

    pub fn bulk_get_pages(
        &self,
        service: Service,
        ids: &[u64],
        query: &Query,
    ) -> Result<Vec<Value>> {
        bulk_fetch(ids, DEFAULT_CHUNK_SIZE, |chunk| {
            let response =
                self.get_service(service, &query.with_selector(Selector::Ids(chunk.to_vec())))?;
            Ok(vec![response])
        })
    }
}
