//! Template Scenario Tests
//!
//! Rendering behavior as seen by a caller of the template crate.

use prompt_studio_template::{
    default_context, infer, infer_schema, render, ParamValue, PlaceholderKind, PlaceholderSpec,
    RenderContext, TemplateError,
};

fn context(pairs: &[(&str, &str)]) -> RenderContext {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), ParamValue::Text(v.to_string())))
        .collect()
}

#[test]
fn test_expert_helper_renders() {
    let template = "Act as a {{ expertise }} and help with {{ task }}.";
    assert_eq!(infer(template), vec!["expertise", "task"]);

    let out = render(
        template,
        &[],
        &context(&[("expertise", "historian"), ("task", "dating an artifact")]),
    )
    .unwrap();
    assert_eq!(out, "Act as a historian and help with dating an artifact.");
}

#[test]
fn test_integer_mismatch_is_not_zero() {
    let schema = vec![PlaceholderSpec::new("count", PlaceholderKind::Integer)];
    let err = render("List {{ count }} ideas", &schema, &context(&[("count", "three")])).unwrap_err();
    assert!(matches!(err, TemplateError::TypeMismatch { ref name, .. } if name == "count"));
}

#[test]
fn test_all_missing_reported_together() {
    let err = render("{{ a }} {{ b }} {{ c }}", &[], &context(&[("b", "x")])).unwrap_err();
    assert_eq!(
        err,
        TemplateError::MissingRequired {
            names: vec!["a".to_string(), "c".to_string()]
        }
    );
}

#[test]
fn test_empty_string_is_a_value() {
    let out = render("[{{ a }}]", &[], &context(&[("a", "")])).unwrap();
    assert_eq!(out, "[]");
}

#[test]
fn test_forbidden_constructs_rejected() {
    let ctx = context(&[("x", "v"), ("items", "v")]);
    for template in [
        "{{ x.__class__ }}",
        "{% for i in items %}{{ i }}{% endfor %}",
        "{{ x[0] }}",
        "{% include 'other.txt' %}",
    ] {
        let err = render(template, &[], &ctx).unwrap_err();
        assert!(
            matches!(err, TemplateError::Forbidden { .. }),
            "{} gave {:?}",
            template,
            err
        );
    }
}

#[test]
fn test_choice_kinds() {
    let schema = vec![
        PlaceholderSpec::new("tone", PlaceholderKind::SingleChoice).with_choices(["calm", "firm"]),
        PlaceholderSpec::new("langs", PlaceholderKind::MultiChoice).with_choices(["en", "fr", "de"]),
    ];
    let out = render(
        "{{ tone }}: {{ langs }}",
        &schema,
        &context(&[("tone", "firm"), ("langs", "en,de")]),
    )
    .unwrap();
    assert_eq!(out, "firm: en, de");

    let err = render(
        "{{ tone }}: {{ langs }}",
        &schema,
        &context(&[("tone", "loud"), ("langs", "en")]),
    )
    .unwrap_err();
    assert!(matches!(err, TemplateError::InvalidChoice { .. }));
}

#[test]
fn test_defaults_render_without_placeholders_left() {
    let template = "Dear {{ name }},{% if formal %} kindly{% endif %} review {{ doc | default('the draft') }}.";
    let schema = infer_schema(template);
    let out = render(template, &schema, &default_context(&schema)).unwrap();
    assert_eq!(out, "Dear , review the draft.");
    assert!(!out.contains("{{"));
}
