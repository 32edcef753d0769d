use convo_core::CitationEntry;
use convo_engine::{
    ExtractionError, ExtractionPipeline, MarkdownConverter, MarkdownRules, PanelSelectors,
    SidePanel,
};
use pretty_assertions::assert_eq;

fn to_markdown(html: &str) -> String {
    MarkdownConverter::new(&MarkdownRules::default())
        .convert(html)
        .markdown
}

#[test]
fn anchor_with_href_becomes_markdown_link() {
    assert_eq!(to_markdown(r#"<a href="https://e.co">T</a>"#), "[T](https://e.co)");
    assert_eq!(to_markdown("<a>T</a>"), "T");
    assert_eq!(to_markdown(r#"<a href="">T</a>"#), "T");
}

#[test]
fn empty_anchor_uses_fallback_label() {
    assert_eq!(to_markdown(r#"<a href="https://x.io"></a>"#), "[link](https://x.io)");
}

#[test]
fn site_name_attribute_wins_over_inner_text() {
    assert_eq!(
        to_markdown(r#"<a href="https://w.org" data-site-name="Wikipedia">3</a>"#),
        "[Wikipedia](https://w.org)"
    );
}

#[test]
fn paragraphs_headings_and_lists() {
    assert_eq!(
        to_markdown("<p>Hello <b>world</b></p><p>Second&nbsp;line</p>"),
        "Hello world\n\nSecond line"
    );
    assert_eq!(
        to_markdown("<h2>Title</h2><ul><li>one</li><li>two</li></ul>"),
        "## Title\n\n- one\n- two"
    );
    assert_eq!(to_markdown("line one<br>line two"), "line one\nline two");
}

#[test]
fn scripts_and_styles_are_dropped() {
    assert_eq!(
        to_markdown("<div>keep<script>var x = 1;</script><style>p { color: red }</style></div>"),
        "keep"
    );
}

#[test]
fn entities_are_decoded_and_blank_runs_collapsed() {
    assert_eq!(
        to_markdown("<p>a &amp; b   &lt;c&gt;</p>\n\n\n<p>d</p>"),
        "a & b <c>\n\nd"
    );
}

#[test]
fn inline_markers_render_as_bracketed_names() {
    let rules = MarkdownRules {
        inline_marker_classes: vec!["rag-tag".to_string()],
        ..MarkdownRules::default()
    };
    let out = MarkdownConverter::new(&rules).convert(
        r#"<p>See <span class="rag-tag" data-site-name="Wiki">1</span> and <span class="rag-tag"></span>.</p>"#,
    );
    assert_eq!(out.markdown, "See [Wiki] and [source].");
    assert!(out.inline_links.is_empty());
}

#[test]
fn marker_without_site_name_uses_inner_text() {
    let rules = MarkdownRules {
        inline_marker_classes: vec!["container-bhqnGO".to_string()],
        ..MarkdownRules::default()
    };
    let out = MarkdownConverter::new(&rules)
        .convert(r#"<p>Reported by <span class="x container-bhqnGO">Science Daily</span></p>"#);
    assert_eq!(out.markdown, "Reported by [Science Daily]");
}

#[test]
fn dash_prefixed_indices_are_cleaned_when_enabled() {
    let rules = MarkdownRules {
        strip_index_dash: true,
        ..MarkdownRules::default()
    };
    let out = MarkdownConverter::new(&rules).convert(r#"<a href="https://x.io">-6</a>"#);
    assert_eq!(out.markdown, "[6](https://x.io)");
}

#[test]
fn inline_links_are_collected_in_order() {
    let out = MarkdownConverter::new(&MarkdownRules::default()).convert(
        r##"<p><a href="https://a.com">A</a> <a href="#frag">skip</a> <a href="http://b.com">B</a></p>"##,
    );
    assert_eq!(
        out.inline_links,
        vec![
            CitationEntry::new("https://a.com", "A", ""),
            CitationEntry::new("http://b.com", "B", ""),
        ]
    );
}

fn panel_selectors() -> PanelSelectors {
    PanelSelectors {
        item: "a.item".to_string(),
        link: None,
        title: Some(".t".to_string()),
        summary: Some(".s".to_string()),
        max_items: 10,
    }
}

const PANEL_HTML: &str = r#"
<div class="panel">
  <a class="item" href="https://a.com/1"><div class="t">A title</div><div class="s">A snippet</div></a>
  <a class="item" href="https://b.com/2">B first line
second line</a>
  <a class="item" href="ftp://c.example/skip">skip</a>
  <a class="item" href="https://e.com"></a>
</div>
"#;

#[test]
fn panel_entries_follow_fallback_rules() {
    let entries = panel_selectors().parse(PANEL_HTML).unwrap();
    assert_eq!(
        entries,
        vec![
            CitationEntry::new("https://a.com/1", "A title", "A snippet"),
            CitationEntry::new("https://b.com/2", "B first line", "second line"),
            CitationEntry::new("https://e.com", "https://e.com", ""),
        ]
    );
}

#[test]
fn panel_items_without_anchor_use_link_selector() {
    let selectors = PanelSelectors {
        item: "div.result".to_string(),
        link: Some("a[href]".to_string()),
        title: None,
        summary: None,
        max_items: 1,
    };
    let html = r#"
        <div class="result"><span>Headline</span><a href="https://x.com/a">open</a></div>
        <div class="result"><a href="https://y.com/b">second</a></div>
    "#;
    let entries = selectors.parse(html).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].href, "https://x.com/a");
    assert_eq!(entries[0].title, "Headline");
    assert_eq!(entries[0].snippet, "open");
}

#[test]
fn panel_entries_precede_inline_links_and_are_deduplicated() {
    let rules = MarkdownRules::default();
    let selectors = panel_selectors();
    let pipeline = ExtractionPipeline::new(&rules, &selectors);
    let fragment =
        r#"<p>Per <a href="https://b.com/2">B</a> and <a href="https://d.com">D</a></p>"#;
    let panel = SidePanel::from_reference_affordance(PANEL_HTML);

    let extraction = pipeline.extract(fragment, Some(&panel)).unwrap();

    assert_eq!(
        extraction.markdown,
        "Per [B](https://b.com/2) and [D](https://d.com)"
    );
    let hrefs: Vec<&str> = extraction.citations.iter().map(|c| c.href.as_str()).collect();
    assert_eq!(
        hrefs,
        vec!["https://a.com/1", "https://b.com/2", "https://e.com", "https://d.com"]
    );
    assert_eq!(extraction.citations[1].title, "B first line");
}

#[test]
fn affordance_without_entries_is_a_contract_violation() {
    let rules = MarkdownRules::default();
    let selectors = panel_selectors();
    let pipeline = ExtractionPipeline::new(&rules, &selectors);
    let empty_panel = SidePanel::from_reference_affordance("<div>loading</div>");

    let result = pipeline.extract("<p>answer</p>", Some(&empty_panel));
    assert!(matches!(
        result,
        Err(ExtractionError::ContractViolation { .. })
    ));

    let optional_panel = SidePanel::new("<div>loading</div>");
    let extraction = pipeline.extract("<p>answer</p>", Some(&optional_panel)).unwrap();
    assert_eq!(extraction.markdown, "answer");
    assert!(extraction.citations.is_empty());
}
