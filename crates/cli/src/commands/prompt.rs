use super::{load_runtime, CommandResult};
use shopper_core::build_system_prompt;

pub fn run(weather: Option<String>, location: Option<String>) -> CommandResult {
    let (config, catalog) = match load_runtime("prompt") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let weather = weather.unwrap_or(config.session.default_weather);
    let location = location.unwrap_or(config.session.default_location);

    CommandResult::raw(build_system_prompt(catalog.all(), &weather, &location))
}
