use esmd_core::Target;
use miette::Result;

pub fn run(user_agent: &str, json: bool) -> Result<()> {
    let target = Target::from_user_agent(user_agent);
    if json {
        println!("{}", serde_json::json!({ "target": target.as_str() }));
    } else {
        println!("{target}");
    }
    Ok(())
}
