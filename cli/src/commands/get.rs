use anyhow::{anyhow, Context, Result};
use log::info;
use nexus_client::{Client, MemberId, PageOptions, Query, Selector, Service};
use structopt::StructOpt;

use crate::{
    printer::{named_objects, Printer},
    utils::parse_key_value,
};

#[derive(Debug, StructOpt)]
pub struct GetArgs {
    #[structopt(name = "service")]
    /// Service to read from, e.g. `advertiser`, `line-item` or `segment`
    service: Service,

    #[structopt(long = "id")]
    /// Only get the objects with these ids. Can be repeated.
    ids: Vec<u64>,

    #[structopt(long = "advertiser-id")]
    /// Restrict to objects of this advertiser
    advertiser_id: Option<u64>,

    #[structopt(long = "member-id")]
    /// Member owning the object, for services that need one next to `--id`
    member_id: Option<u64>,

    #[structopt(long = "search")]
    /// Free text search on names and ids
    search: Option<String>,

    #[structopt(long = "code")]
    /// Select an object by its code
    code: Option<String>,

    #[structopt(long = "name")]
    /// Select objects by name
    name: Option<String>,

    #[structopt(long = "filter", parse(try_from_str = parse_key_value))]
    /// Extra `key=value` query parameters. Can be repeated.
    filters: Vec<(String, String)>,

    #[structopt(long = "all")]
    /// Walk through every page of results
    all: bool,

    #[structopt(long = "page-size", default_value = "100")]
    /// Number of objects requested per page with `--all`
    page_size: u64,

    #[structopt(long = "limit")]
    /// Maximum number of pages requested with `--all`
    limit: Option<u64>,

    #[structopt(long = "full")]
    /// Print the raw API responses instead of an id to name table
    full: bool,
}

pub fn run(args: &GetArgs, client: Client, printer: &Printer) -> Result<()> {
    let service = args.service;
    let query = build_query(args)?;

    if args.ids.len() > 1 {
        if query.selector().is_some() {
            return Err(anyhow!(
                "Several `--id` values cannot be combined with another selector."
            ));
        }
        info!("Getting {} `{}` objects by id", args.ids.len(), service);
        return if args.full {
            let pages = client
                .bulk_get_pages(service, &args.ids, &query)
                .context("Operation to get objects by id has failed.")?;
            printer.print_json(&pages)
        } else {
            let names = client
                .bulk_get_names(service, &args.ids, &query)
                .context("Operation to get objects by id has failed.")?;
            printer.print_resources(&named_objects(names))
        };
    }

    if args.all {
        let options = PageOptions {
            page_size: args.page_size,
            limit: args.limit,
        };
        return if args.full {
            let pages = client
                .get_all_pages(service, &query, options)
                .context("Operation to list objects has failed.")?;
            printer.print_json(&pages)
        } else {
            let names = client
                .get_all_names(service, &query, options)
                .context("Operation to list objects has failed.")?;
            info!("Got {} `{}` objects", names.len(), service);
            printer.print_resources(&named_objects(names))
        };
    }

    if args.full {
        let response = client
            .get_service(service, &query)
            .context("Operation to get objects has failed.")?;
        printer.print_json(&[response])
    } else {
        let names = client
            .get_names(service, &query)
            .context("Operation to get objects has failed.")?;
        printer.print_resources(&named_objects(names))
    }
}

fn build_query(args: &GetArgs) -> Result<Query> {
    let GetArgs {
        ids,
        advertiser_id,
        member_id,
        search,
        code,
        name,
        filters,
        ..
    } = args;

    let mut query = Query::new();
    let mut advertiser_id = *advertiser_id;
    let mut member_id = *member_id;

    if let [id] = ids.as_slice() {
        let selector = match (advertiser_id.take(), member_id.take()) {
            (Some(advertiser_id), None) => Selector::IdForAdvertiser {
                id: *id,
                advertiser_id,
            },
            (None, Some(member_id)) => Selector::IdForMember {
                id: *id,
                member_id: MemberId(member_id),
            },
            (None, None) => Selector::Id(*id),
            (Some(_), Some(_)) => {
                return Err(anyhow!(
                    "`--advertiser-id` and `--member-id` cannot both qualify an `--id`."
                ))
            }
        };
        query = query.select(selector)?;
    }

    if let Some(advertiser_id) = advertiser_id {
        query = query.select(Selector::AdvertiserId(advertiser_id))?;
    }
    if let Some(search) = search {
        query = query.select(Selector::Search(search.clone()))?;
    }
    if let Some(code) = code {
        query = query.select(Selector::Code(code.clone()))?;
    }
    if let Some(name) = name {
        query = query.select(Selector::Name(name.clone()))?;
    }
    if let Some(member_id) = member_id {
        query = query.filter("member_id", member_id.to_string());
    }
    for (key, value) in filters {
        query = query.filter(key.clone(), value.clone());
    }
    Ok(query)
}
