use sail_lua_fdw::options::{validate_options, OptionContext};

pub fn run_validate(context: &str, options: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let context = context.parse::<OptionContext>()?;
    validate_options(context, options.iter().map(String::as_str))?;
    println!("options are valid for the {context} context");
    Ok(())
}
