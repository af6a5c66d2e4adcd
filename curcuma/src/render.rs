//! Template instances
//!
//! Parse once, render many times. `Template::parse` runs the compiler a
//! single time and realizes the resulting program into one reusable
//! closure; every `render` call merges the default context with the
//! per-call one and invokes that closure.

use crate::compiler;
use crate::error::TemplateSource;
use crate::eval::{self, Context, Value};
use miette::Result;
use std::collections::HashMap;
use std::fmt;

/// The realized rendering routine: the compiled program captured in a
/// single reusable closure.
type RenderFn = Box<dyn Fn(&HashMap<String, Value>) -> Result<String> + Send + Sync>;

/// A compiled template ready for rendering.
///
/// Immutable after construction; a single instance can be rendered
/// concurrently from multiple threads, provided user-supplied [`Object`]
/// and filter implementations don't share unsynchronized mutable state.
///
/// [`Object`]: crate::Object
pub struct Template {
    source: TemplateSource,
    defaults: Context,
    render_fn: RenderFn,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.source.name)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Template {
    /// Parse a template from source.
    ///
    /// Fails with a syntax error if the template is malformed; a returned
    /// instance is always fully usable.
    pub fn parse(name: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        Self::parse_with(name, source, [])
    }

    /// Parse a template with default context layers.
    ///
    /// Later layers override earlier ones, and the per-render context
    /// overrides them all.
    pub fn parse_with(
        name: impl Into<String>,
        source: impl Into<String>,
        layers: impl IntoIterator<Item = Context>,
    ) -> Result<Self> {
        let source = TemplateSource::new(name, source);
        let mut defaults = Context::new();
        for layer in layers {
            defaults.merge(&layer);
        }
        let program = compiler::compile(&source)?;
        tracing::debug!(
            template = %source.name,
            statements = program.len(),
            "compiled template"
        );
        let program_source = source.clone();
        let render_fn: RenderFn =
            Box::new(move |context| eval::execute(&program, context, &program_source));
        Ok(Self {
            source,
            defaults,
            render_fn,
        })
    }

    /// Render with the given context merged over the defaults.
    pub fn render(&self, ctx: &Context) -> Result<String> {
        tracing::trace!(template = %self.source.name, "render");
        let mut merged = self.defaults.clone();
        merged.merge(ctx);
        (self.render_fn)(merged.vars())
    }

    /// Render with a simple key-value context.
    pub fn render_with<I, K, V>(&self, vars: I) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.render(&vars.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LookupError, SyntaxError, TypeError, UndefinedError};
    use crate::eval::Object;

    /// Simple testing object: a bag of attributes.
    #[derive(Debug)]
    struct Bag(HashMap<String, Value>);

    impl Bag {
        fn new<K: Into<String>, V: Into<Value>>(attrs: impl IntoIterator<Item = (K, V)>) -> Value {
            Value::object(Bag(attrs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect()))
        }
    }

    impl Object for Bag {
        fn attr(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }
    }

    fn upper() -> Value {
        Value::func(|args| Ok(Value::String(args[0].render_to_string().to_uppercase())))
    }

    fn second() -> Value {
        Value::func(|args| {
            let s = args[0].render_to_string();
            Ok(Value::String(
                s.chars().nth(1).map(String::from).unwrap_or_default(),
            ))
        })
    }

    fn try_render(text: &str, ctx: Context, expected: &str) {
        let template = Template::parse("test", text).unwrap();
        assert_eq!(template.render(&ctx).unwrap(), expected);
    }

    fn assert_syntax_err(text: &str, message: &str, fragment: &str) {
        let err = Template::parse("test", text).unwrap_err();
        let syn = err
            .downcast_ref::<SyntaxError>()
            .unwrap_or_else(|| panic!("expected a syntax error, got: {err:?}"));
        assert_eq!(syn.message, message);
        assert_eq!(syn.fragment, fragment);
    }

    #[test]
    fn passthrough() {
        assert_eq!(
            Template::parse("test", "Hello").unwrap().render(&Context::new()).unwrap(),
            "Hello"
        );
        assert_eq!(
            Template::parse("test", "Hello, 20% fun time!")
                .unwrap()
                .render(&Context::new())
                .unwrap(),
            "Hello, 20% fun time!"
        );
    }

    #[test]
    fn variables() {
        try_render(
            "Hello, {{ name }}!",
            [("name", "Ned")].into_iter().collect(),
            "Hello, Ned!",
        );
    }

    #[test]
    fn undefined_variable() {
        let template = Template::parse("test", "Hi, {{ name }}!").unwrap();
        let err = template.render(&Context::new()).unwrap_err();
        let undef = err.downcast_ref::<UndefinedError>().expect("undefined error");
        assert_eq!(undef.name, "name");
    }

    #[test]
    fn undefined_is_never_empty_string() {
        let template = Template::parse("test", "[{{ ghost }}]").unwrap();
        assert!(template.render(&Context::new()).is_err());
    }

    #[test]
    fn pipes() {
        let mut ctx = Context::new();
        ctx.set("name", "Ned");
        ctx.set("upper", upper());
        ctx.set("second", second());
        try_render("Hello, {{ name|upper }}!", ctx.clone(), "Hello, NED!");
        try_render("Hello, {{ name|upper|second }}!", ctx, "Hello, E!");
    }

    #[test]
    fn reusability() {
        let mut globals = Context::new();
        globals.set("upper", upper());
        globals.set("punct", "!");
        let template =
            Template::parse_with("test", "This is {{ name|upper }}{{ punct }}", [globals])
                .unwrap();
        assert_eq!(
            template.render_with([("name", "Ned")]).unwrap(),
            "This is NED!"
        );
        assert_eq!(
            template.render_with([("name", "Ben")]).unwrap(),
            "This is BEN!"
        );
    }

    #[test]
    fn later_default_layers_override_earlier_ones() {
        let first: Context = [("who", "Ned")].into_iter().collect();
        let second: Context = [("who", "Ben")].into_iter().collect();
        let template =
            Template::parse_with("test", "Hi {{ who }}", [first, second]).unwrap();
        assert_eq!(template.render(&Context::new()).unwrap(), "Hi Ben");
        // and the per-render context overrides them all
        assert_eq!(template.render_with([("who", "Cara")]).unwrap(), "Hi Cara");
    }

    #[test]
    fn attributes() {
        let obj = Bag::new([("a", "Ay")]);
        try_render("{{ obj.a }}", [("obj", obj.clone())].into_iter().collect(), "Ay");

        let mut attrs = HashMap::new();
        attrs.insert("bob".to_string(), obj);
        attrs.insert("b".to_string(), Value::from("Bee"));
        let obj2 = Value::object(Bag(attrs));
        try_render(
            "{{ obj2.bob.a }} {{ obj2.b }}",
            [("obj2", obj2)].into_iter().collect(),
            "Ay Bee",
        );
    }

    #[test]
    fn member_functions_are_invoked() {
        // a zero-argument callable attribute is called during lookup
        let txt = "Once".to_string();
        let ditto = Value::func(move |_| Ok(Value::String(format!("{txt}{txt}"))));
        let obj = Bag::new([("ditto", ditto)]);
        try_render("{{obj.ditto}}", [("obj", obj)].into_iter().collect(), "OnceOnce");
    }

    #[test]
    fn item_access() {
        try_render(
            "Look: {% for n in nums %}{{ n }}, {% endfor %}done.",
            [("nums", vec![1i64, 2, 3, 4])].into_iter().collect(),
            "Look: 1, 2, 3, 4, done.",
        );
    }

    #[test]
    fn filtered_loop_source() {
        let mut ctx = Context::new();
        ctx.set("nums", vec![1i64, 2, 3, 4]);
        ctx.set(
            "rev",
            Value::func(|args| match &args[0] {
                Value::List(items) => {
                    Ok(Value::List(items.iter().rev().cloned().collect()))
                }
                other => Ok(other.clone()),
            }),
        );
        try_render(
            "Look: {% for n in nums|rev %}{{ n }}, {% endfor %}done.",
            ctx,
            "Look: 4, 3, 2, 1, done.",
        );
    }

    #[test]
    fn empty_loops() {
        try_render(
            "Empty: {% for n in nums %}{{ n }}, {% endfor %}done.",
            [("nums", Vec::<i64>::new())].into_iter().collect(),
            "Empty: done.",
        );
    }

    #[test]
    fn multiline_loops() {
        try_render(
            "Look: \n{% for n in nums %}\n{{ n }}, \n{% endfor %}done.",
            [("nums", vec![1i64, 2, 3])].into_iter().collect(),
            "Look: \n\n1, \n\n2, \n\n3, \ndone.",
        );
    }

    #[test]
    fn multiple_loops() {
        try_render(
            "{% for n in nums %}{{ n }}{% endfor %} and \
             {% for n in nums %}{{ n }}{% endfor %}",
            [("nums", vec![1i64, 2, 3])].into_iter().collect(),
            "123 and 123",
        );
    }

    #[test]
    fn comments() {
        try_render(
            "Hello, {# Name goes here: #}{{ name }}!",
            [("name", "Ned")].into_iter().collect(),
            "Hello, Ned!",
        );
        try_render(
            "Hello, {# Name\ngoes\nhere: #}{{ name }}!",
            [("name", "Ned")].into_iter().collect(),
            "Hello, Ned!",
        );
    }

    #[test]
    fn comments_do_not_affect_variable_tracking() {
        // `ghost` appears only inside a comment; its absence from the
        // context must not matter
        try_render(
            "{# {{ ghost }} #}ok",
            Context::new(),
            "ok",
        );
    }

    #[test]
    fn if_blocks() {
        let cases: &[(i64, i64, &str)] = &[(1, 0, "Hi, NED!"), (0, 1, "Hi, BEN!"), (0, 0, "Hi, !")];
        for &(ned, ben, expected) in cases {
            try_render(
                "Hi, {% if ned %}NED{% endif %}{% if ben %}BEN{% endif %}!",
                [("ned", ned), ("ben", ben)].into_iter().collect(),
                expected,
            );
        }
        try_render(
            "Hi, {% if ned %}NED{% if ben %}BEN{% endif %}{% endif %}!",
            [("ned", 1i64), ("ben", 0)].into_iter().collect(),
            "Hi, NED!",
        );
        try_render(
            "Hi, {% if ned %}NED{% if ben %}BEN{% endif %}{% endif %}!",
            [("ned", 1i64), ("ben", 1)].into_iter().collect(),
            "Hi, NEDBEN!",
        );
    }

    #[test]
    fn complex_if_conditions() {
        // dotted access with an auto-invoked member, piped into a filter
        let mut it = HashMap::new();
        it.insert("x".to_string(), Value::Int(1));
        it.insert("y".to_string(), Value::Int(0));
        let getit = Value::func(move |_| Ok(Value::Dict(it.clone())));
        let obj = Bag::new([("getit", getit)]);

        let mut ctx = Context::new();
        ctx.set("obj", obj);
        ctx.set(
            "str",
            Value::func(|args| Ok(Value::String(args[0].render_to_string()))),
        );
        try_render(
            "@{% if obj.getit.x %}X{% endif %}\
             {% if obj.getit.y %}Y{% endif %}\
             {% if obj.getit.y|str %}S{% endif %}!",
            ctx,
            "@XS!",
        );
    }

    #[test]
    fn loops_and_ifs_nest() {
        try_render(
            "@{% for n in nums %}{% if n %}Z{% endif %}{{ n }}{% endfor %}!",
            [("nums", vec![0i64, 1, 2])].into_iter().collect(),
            "@0Z1Z2!",
        );
        try_render(
            "X{% if nums %}@{% for n in nums %}{{ n }}{% endfor %}{% endif %}!",
            [("nums", vec![0i64, 1, 2])].into_iter().collect(),
            "X@012!",
        );
        try_render(
            "X{% if nums %}@{% for n in nums %}{{ n }}{% endfor %}{% endif %}!",
            [("nums", Vec::<i64>::new())].into_iter().collect(),
            "X!",
        );
    }

    #[test]
    fn nested_loops() {
        try_render(
            "@{% for n in nums %}\
             {% for i in name %}{{ i }}{{ n }}{% endfor %}\
             {% endfor %}!",
            [
                ("nums", Value::from(vec![1i64, 2, 3])),
                ("name", Value::from(vec!["a", "b", "c"])),
            ]
            .into_iter()
            .collect(),
            "@a1b1c1a2b2c2a3b3c3!",
        );
    }

    #[test]
    fn lookup_failure_during_evaluation() {
        let template = Template::parse("test", "Hey {{ foo.bar.baz }} there").unwrap();
        let err = template.render_with([("foo", Value::None)]).unwrap_err();
        let lookup = err.downcast_ref::<LookupError>().expect("lookup error");
        assert_eq!(lookup.base_type, "none");
        assert_eq!(lookup.segment, "bar");
    }

    #[test]
    fn extraction_is_eager_even_on_untaken_branches() {
        // `x` is referenced only inside the false branch, but the prelude
        // still pulls it from the context
        let template =
            Template::parse("test", "{% if flag %}{{ x }}{% endif %}ok").unwrap();
        let err = template.render_with([("flag", false)]).unwrap_err();
        let undef = err.downcast_ref::<UndefinedError>().expect("undefined error");
        assert_eq!(undef.name, "x");
    }

    #[test]
    fn no_state_leaks_between_renders() {
        let template =
            Template::parse("test", "{% for n in nums %}{{ n }}{% endfor %}").unwrap();
        assert_eq!(template.render_with([("nums", vec![1i64, 2])]).unwrap(), "12");
        assert_eq!(
            template
                .render_with([("nums", Vec::<i64>::new())])
                .unwrap(),
            ""
        );
    }

    #[test]
    fn strings_iterate_by_character() {
        try_render(
            "{% for c in word %}{{ c }}.{% endfor %}",
            [("word", "abc")].into_iter().collect(),
            "a.b.c.",
        );
    }

    #[test]
    fn looping_a_non_iterable_is_a_type_error() {
        let template =
            Template::parse("test", "{% for n in nums %}{{ n }}{% endfor %}").unwrap();
        let err = template.render_with([("nums", 5i64)]).unwrap_err();
        let type_err = err.downcast_ref::<TypeError>().expect("type error");
        assert_eq!(type_err.found, "int");
    }

    #[test]
    fn piping_into_a_non_callable_is_a_type_error() {
        let template = Template::parse("test", "{{ name|upper }}").unwrap();
        let err = template
            .render_with([("name", "Ned"), ("upper", "not a function")])
            .unwrap_err();
        assert!(err.downcast_ref::<TypeError>().is_some());
    }

    #[test]
    fn filter_errors_pass_through() {
        let mut ctx = Context::new();
        ctx.set("name", "Ned");
        ctx.set(
            "explode",
            Value::func(|_| Err(miette::miette!("filter blew up"))),
        );
        let template = Template::parse("test", "{{ name|explode }}").unwrap();
        let err = template.render(&ctx).unwrap_err();
        assert_eq!(err.to_string(), "filter blew up");
    }

    #[test]
    fn bad_names() {
        assert_syntax_err("Wat: {{ var%&!@ }}", "Not a valid name", "var%&!@");
        assert_syntax_err(
            "Wat: {% for @ in x %}{% endfor %}",
            "Not a valid name",
            "@",
        );
    }

    #[test]
    fn bogus_tag_syntax() {
        assert_syntax_err("Huh: {% bogus %}goes{% endbogus %}??", "Don't understand tag", "bogus");
    }

    #[test]
    fn malformed_if() {
        assert_syntax_err("Test: {% if %}hi!{% endif %}", "Don't understand if", "{% if %}");
        assert_syntax_err(
            "Test: {% if this or that %}Hello{% endif %}",
            "Don't understand if",
            "{% if this or that %}",
        );
    }

    #[test]
    fn malformed_for() {
        assert_syntax_err("Weird: {% for %}loop{% endfor %}", "Don't understand for", "{% for %}");
        assert_syntax_err(
            "Weird: {% for x from nums %}loop{% endfor %}",
            "Don't understand for",
            "{% for x from nums %}",
        );
        assert_syntax_err(
            "Weird: {% for x, y in nums %}loop{% endfor %}",
            "Don't understand for",
            "{% for x, y in nums %}",
        );
    }

    #[test]
    fn bad_nesting() {
        assert_syntax_err("{% if x %}X", "Unmatched action tag", "if");
        assert_syntax_err("{% if x %}Hello{% endfor %}", "Mismatched end tag", "for");
        assert_syntax_err(
            "{% if x %}{% endif %}hello{% endif %}",
            "Too many ends",
            "{% endif %}",
        );
    }

    #[test]
    fn malformed_end() {
        assert_syntax_err("{% if x %}Hello{% end if %}", "Don't understand end", "{% end if %}");
        assert_syntax_err(
            "{% if x %}Hello{% endif now %}",
            "Don't understand end",
            "{% endif now %}",
        );
    }

    #[test]
    fn construction_fails_atomically() {
        assert!(Template::parse("test", "{% if x %}").is_err());
        assert!(Template::parse("test", "{% endfor %}").is_err());
    }

    #[test]
    fn rendered_document() {
        let mut ctx = Context::new();
        ctx.set("user_name", "Charlie");
        ctx.set(
            "products",
            Value::from(vec![
                Bag::new([("name", Value::from("Apple")), ("price", Value::from(1.5))]),
                Bag::new([("name", Value::from("Fig")), ("price", Value::from(3.25))]),
            ]),
        );
        ctx.set(
            "format_price",
            Value::func(|args| match &args[0] {
                Value::Float(f) => Ok(Value::String(format!("${f:.2}"))),
                Value::Int(i) => Ok(Value::String(format!("${i}.00"))),
                other => Err(miette::miette!("not a price: {other:?}")),
            }),
        );
        let template = Template::parse(
            "products.html",
            "Welcome, {{ user_name }}!\
             {% for product in products %} {{ product.name }}: {{ product.price|format_price }};{% endfor %}",
        )
        .unwrap();
        insta::assert_snapshot!(
            template.render(&ctx).unwrap(),
            @"Welcome, Charlie! Apple: $1.50; Fig: $3.25;"
        );
    }
}
