use rekindle_core::ApplicationResult;
use rekindle_web::server::WebServer;

#[tokio::main]
async fn main() -> ApplicationResult<()> {
    let config_file = if std::path::Path::new("demos/weather-demo/application.toml").exists() {
        "demos/weather-demo/application.toml"
    } else {
        "application.toml"
    };

    let context = weather_demo::application(config_file).run()?;
    let routes = weather_demo::routes(&context)?;

    println!("\nAvailable endpoints:");
    for route in routes.routes() {
        println!("  {:<6} {}", route.method.as_str(), route.path);
    }
    println!();

    WebServer::new(context)?.with_routes(routes).run().await
}
