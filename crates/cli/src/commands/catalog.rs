use shopper_core::{Category, ProductFilter};

use super::{load_runtime, to_data, CommandResult, EXIT_USAGE};

const COMMAND: &str = "catalog";

#[derive(Debug, Default, Clone)]
pub struct CatalogArgs {
    pub category: Option<String>,
    pub weather: Option<String>,
    pub search: Option<String>,
    pub in_stock: bool,
    pub stats: bool,
}

pub fn run(args: CatalogArgs) -> CommandResult {
    let (_, catalog) = match load_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    if args.stats {
        let stats = catalog.stats();
        let message = format!(
            "{} products, {} in stock, {} out of stock",
            stats.total, stats.in_stock, stats.out_of_stock
        );
        return CommandResult::success_with_data(COMMAND, message, to_data(&stats));
    }

    let category = match args.category.as_deref().map(str::parse::<Category>).transpose() {
        Ok(category) => category,
        Err(error) => return CommandResult::failure(COMMAND, "invalid_argument", error, EXIT_USAGE),
    };

    let filter = ProductFilter {
        category,
        weather: args.weather,
        in_stock: args.in_stock,
        search: args.search,
        ..ProductFilter::default()
    };
    let products = catalog.advanced_search(&filter);

    CommandResult::success_with_data(
        COMMAND,
        format!("{} of {} products match", products.len(), catalog.len()),
        to_data(&products),
    )
}
