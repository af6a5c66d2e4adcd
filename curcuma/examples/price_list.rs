//! Render a small product listing, the classic template-engine demo.
//!
//! Run with `cargo run --example price_list`; set `RUST_LOG=debug` to see
//! the compile-time tracing.

use curcuma::{Context, Object, Template, Value};
use tracing_subscriber::filter::EnvFilter;

const TEMPLATE: &str = "
<p>Welcome, {{user_name}}!</p>
<p>Products:</p>
<ul>
{% for product in product_list %}    <li>{{ product.name }}: {{ product.price|format_price }}</li>
{% endfor %}</ul>
";

#[derive(Debug)]
struct Product {
    name: &'static str,
    price: f64,
}

impl Object for Product {
    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(self.name.into()),
            "price" => Some(self.price.into()),
            _ => None,
        }
    }
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let products = vec![
        Value::object(Product {
            name: "Apple",
            price: 1.0,
        }),
        Value::object(Product {
            name: "Fig",
            price: 1.5,
        }),
        Value::object(Product {
            name: "Pomegranate",
            price: 3.25,
        }),
    ];

    let mut data = Context::new();
    data.set("user_name", "Charlie");
    data.set("product_list", products);

    let mut filters = Context::new();
    filters.set(
        "format_price",
        Value::func(|args| match &args[0] {
            Value::Float(f) => Ok(Value::String(format!("${f:.2}"))),
            Value::Int(i) => Ok(Value::String(format!("${i}.00"))),
            other => Err(miette::miette!("not a price: {other:?}")),
        }),
    );

    let template = Template::parse_with("price_list.html", TEMPLATE, [data, filters])?;
    print!("{}", template.render(&Context::new())?);
    Ok(())
}
