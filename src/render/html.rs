//! Static HTML snapshot of a rendered page.

use super::page::{CardElement, ImageState, Page};

/// Render the whole document: status line plus every attached card.
pub fn page_document(title: &str, page: &Page) -> String {
    let mut rows = String::new();
    for element in page.cards() {
        rows.push_str(&card_fragment(element));
    }

    let sentinel = if page.has_sentinel() {
        r#"<div id="sentinel" aria-hidden="true"></div>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="fr">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>{css}</style>
</head>
<body>
    <header id="main-header">
        <h1>{title}</h1>
        <p id="status">{status}</p>
    </header>
    <main id="rows">
{rows}
    </main>
    {sentinel}
</body>
</html>"#,
        title = html_escape(title),
        css = CSS,
        status = html_escape(page.status()),
        rows = rows,
        sentinel = sentinel,
    )
}

/// One card: image, date line, name line and scientific name.
pub fn card_fragment(element: &CardElement) -> String {
    let card = &element.card;

    let image = match (&element.image.src, element.image.state) {
        (Some(src), ImageState::Ready | ImageState::Loading) => format!(
            r#"<img class="bird-img {}" src="{}" alt="{}" loading="lazy">"#,
            element.image.state.class(),
            html_escape(src),
            html_escape(&card.name)
        ),
        _ => format!(
            r#"<div class="bird-img {}" data-species="{}"></div>"#,
            element.image.state.class(),
            html_escape(&element.image.species_key)
        ),
    };

    let name = match &card.link {
        Some(link) => format!(
            r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
            html_escape(link),
            html_escape(&card.name)
        ),
        None => html_escape(&card.name),
    };

    let badge = card
        .count_badge()
        .map(|b| format!(r#" <span class="bird-count">{}</span>"#, b))
        .unwrap_or_default();

    let confidence = card
        .confidence
        .as_ref()
        .map(|c| format!(r#" <span class="bird-confidence">{}</span>"#, html_escape(c)))
        .unwrap_or_default();

    format!(
        r#"        <article class="bird-row" id="card-{id}">
            {image}
            <div class="bird-date">{when}</div>
            <div class="bird-main">{name}{badge}{confidence}
                <div class="bird-sci">{sci}</div>
            </div>
        </article>
"#,
        id = element.id.0,
        image = image,
        when = html_escape(&card.when),
        name = name,
        badge = badge,
        confidence = confidence,
        sci = html_escape(&card.sci_name),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub const CSS: &str = r#"
:root { --bg: #fff; --text: #222; --muted: #666; --accent: #047857; --border: #ddd; }
@media (prefers-color-scheme: dark) {
    :root { --bg: #1a1a1a; --text: #e0e0e0; --muted: #888; --accent: #34d399; --border: #444; }
}
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: system-ui, sans-serif; background: var(--bg); color: var(--text); line-height: 1.5; }
#main-header { padding: 1rem; border-bottom: 1px solid var(--border); }
#status { color: var(--muted); }
#rows { display: grid; grid-template-columns: repeat(auto-fill, minmax(220px, 1fr)); gap: 1rem; padding: 1rem; }
.bird-row { border: 1px solid var(--border); border-radius: 6px; padding: 0.5rem; }
.bird-img { width: 100%; aspect-ratio: 4 / 3; object-fit: cover; background: var(--border); border-radius: 4px; }
.img-missing { opacity: 0.4; }
.bird-date { font-size: 0.85em; color: var(--muted); }
.bird-main a { color: var(--accent); }
.bird-count, .bird-confidence { font-size: 0.75em; border-radius: 999px; padding: 0 0.5em; background: var(--border); }
.bird-sci { font-style: italic; color: var(--muted); }
"#;
