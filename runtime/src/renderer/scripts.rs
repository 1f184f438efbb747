//! JavaScript run inside the listing tab.
//!
//! Discovered groups live in `window.__stockcheckGroups` for the life of one
//! document; a navigation wipes them along with the old window. Every script
//! returns a JSON object, never `null` or `undefined`.

use stockcheck_engine::SignalSource;

/// Selector button inside a listbox-style group.
const BUTTON: &str = r#"button.listbox-button__control, button[aria-haspopup="listbox"]"#;

/// Container selectors, one per widget layout, queried in this order.
const LISTBOX_GROUPS: &str = "div.vim.x-sku";
const MSKU_GROUPS: &str = r#"[data-testid="x-msku__group"]"#;
const EVO_GROUPS: &str = r#"[data-testid="x-msku-evo"] .listbox-button"#;
const SELECT_GROUPS: &str =
    "select[name^='variation'], select#msku-sel-1, select.x-msku__select-box";

/// Snippet resolving `g` to the group in `slot`.
///
/// A slot keeps the selector and ordinal it was discovered with. When the
/// widget re-renders in place the saved element is detached, so `g.el` is
/// looked up again from the locator and its listed options are re-read.
fn group_lookup(slot: usize) -> String {
    format!(
        r#"const readOptions = (g) => {{
        if (g.kind === 'select') return [...g.el.querySelectorAll('option')];
        const button = g.el.querySelector('{button}');
        let box = g.el.querySelector('div.listbox__options');
        const controls = button ? button.getAttribute('aria-controls') : null;
        if (!box && controls) box = document.getElementById(controls);
        box = box || g.el;
        const opts = [...box.querySelectorAll('div.listbox__option')];
        return opts.length ? opts : [...box.querySelectorAll("li[role='option']")];
    }};
    const g = (() => {{
        const g = (window.__stockcheckGroups || [])[{slot}];
        if (g && !g.el.isConnected) {{
            const fresh = document.querySelectorAll(g.selector)[g.ordinal];
            if (fresh) {{
                g.el = fresh;
                if (g.options.length) g.options = readOptions(g);
            }}
        }}
        return g;
    }})();"#,
        button = sanitize_js_string(BUTTON),
    )
}

/// Collect every variant group in document order and register it.
pub fn discover_groups() -> String {
    format!(
        r#"(() => {{
    const found = [];
    const push = (el, kind, labelEl, fallback, selector, ordinal) => {{
        if (found.some(f => f.el === el || f.el.contains(el) || el.contains(f.el))) return;
        const label = labelEl ? labelEl.innerText : fallback;
        found.push({{ el, kind, selector, ordinal, label: label == null ? null : String(label) }});
    }};
    const scan = (selector, kind, labelOf, fallbackOf) =>
        document.querySelectorAll(selector).forEach((el, i) =>
            push(el, kind, labelOf(el), fallbackOf(el), selector, i));
    scan('{listbox}', 'listbox', el => el.querySelector('.btn__label'), () => null);
    scan('{msku}', 'listbox', el => el.querySelector('[data-testid="x-msku__group-title"]'), () => null);
    scan('{evo}', 'listbox', el => el.querySelector('.btn__label'), () => null);
    scan('{select}', 'select', el => {{
        const box = el.closest('div');
        return box ? box.querySelector('label, span') : null;
    }}, el => el.getAttribute('name'));
    found.sort((a, b) => (a.el.compareDocumentPosition(b.el) & Node.DOCUMENT_POSITION_FOLLOWING) ? -1 : 1);
    window.__stockcheckGroups = found.map(f => ({{
        el: f.el, kind: f.kind, selector: f.selector, ordinal: f.ordinal, options: []
    }}));
    return {{ groups: found.map(f => ({{ label: f.label, kind: f.kind }})) }};
}})()"#,
        listbox = sanitize_js_string(LISTBOX_GROUPS),
        msku = sanitize_js_string(MSKU_GROUPS),
        evo = sanitize_js_string(EVO_GROUPS),
        select = sanitize_js_string(SELECT_GROUPS),
    )
}

/// Scroll the group into view and open its option list.
pub fn open_group(slot: usize) -> String {
    format!(
        r#"(() => {{
    {lookup}
    if (!g || !g.el.isConnected) return {{ ok: false, reason: 'group is no longer attached' }};
    g.el.scrollIntoView({{ block: 'center' }});
    if (g.kind === 'select') return {{ ok: true }};
    const button = g.el.querySelector('{button}');
    if (!button) return {{ ok: false, reason: 'selector button missing' }};
    if (button.getAttribute('aria-expanded') !== 'true') button.click();
    return {{ ok: true }};
}})()"#,
        lookup = group_lookup(slot),
        button = sanitize_js_string(BUTTON),
    )
}

/// Read the options of an opened group and remember their elements.
pub fn list_options(slot: usize) -> String {
    format!(
        r#"(() => {{
    {lookup}
    if (!g || !g.el.isConnected) return {{ ok: false, reason: 'group is no longer attached', options: [] }};
    const opts = readOptions(g);
    g.options = opts;
    return {{ ok: true, options: opts.map((o, index) => ({{
        index,
        value: o.getAttribute('data-sku-value-name') || (g.kind === 'select' ? o.getAttribute('value') : null),
        label: (o.innerText || o.textContent || '').trim(),
        disabled_marker: o.hasAttribute('disabled') || o.getAttribute('aria-disabled') === 'true',
        class_list: o.getAttribute('class') || ''
    }})) }};
}})()"#,
        lookup = group_lookup(slot),
    )
}

/// Select the listed option at `index`.
pub fn choose_option(slot: usize, index: usize) -> String {
    format!(
        r#"(() => {{
    {lookup}
    if (!g || !g.el.isConnected) return {{ ok: false, reason: 'group is no longer attached' }};
    let o = g.options[{index}];
    if (o && !o.isConnected) {{
        g.options = readOptions(g);
        o = g.options[{index}];
    }}
    if (!o || !o.isConnected) return {{ ok: false, reason: 'option is no longer attached' }};
    if (g.kind === 'select') {{
        g.el.value = o.value;
        g.el.dispatchEvent(new Event('change', {{ bubbles: true }}));
        return {{ ok: true }};
    }}
    o.scrollIntoView({{ block: 'nearest' }});
    const rect = o.getBoundingClientRect();
    if (rect.width === 0 || rect.height === 0) return {{ ok: false, reason: 'option is not visible' }};
    o.click();
    return {{ ok: true }};
}})()"#,
        lookup = group_lookup(slot),
    )
}

/// Close an open option list without choosing.
pub fn dismiss(slot: usize) -> String {
    format!(
        r#"(() => {{
    {lookup}
    if (!g || g.kind === 'select' || !g.el.isConnected) return {{ ok: true }};
    const button = g.el.querySelector('{button}');
    (button || g.el).dispatchEvent(new KeyboardEvent('keydown', {{ key: 'Escape', bubbles: true }}));
    if (button && button.getAttribute('aria-expanded') === 'true') button.click();
    return {{ ok: true }};
}})()"#,
        lookup = group_lookup(slot),
        button = sanitize_js_string(BUTTON),
    )
}

/// First present availability signal, in source order.
pub fn read_availability(sources: &[SignalSource]) -> String {
    let list = sources
        .iter()
        .map(|p| {
            let kind = match p.kind {
                stockcheck_engine::SignalKind::Text => "text",
                stockcheck_engine::SignalKind::PurchaseControl => "purchase_control",
            };
            format!(
                "{{ kind: '{kind}', selector: '{}' }}",
                sanitize_js_string(&p.selector)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"((sources) => {{
    for (const p of sources) {{
        const el = document.querySelector(p.selector);
        if (!el) continue;
        if (p.kind === 'text') {{
            const text = (el.textContent || '').trim();
            if (text) return {{ reading: {{ kind: 'text', selector: p.selector, text }} }};
        }} else {{
            const disabled = el.getAttribute('aria-disabled') === 'true' || el.hasAttribute('disabled');
            return {{ reading: {{ kind: 'purchase_control', selector: p.selector, disabled }} }};
        }}
    }}
    return {{ reading: null }};
}})([{list}])"#
    )
}

/// Which challenge marker, if any, the current document shows.
pub fn detect_challenge(markers: &[String]) -> String {
    let list = markers
        .iter()
        .map(|m| format!("'{}'", sanitize_js_string(&m.to_lowercase())))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"((markers) => {{
    const body = (document.body ? document.body.innerText : '').toLowerCase();
    const hit = markers.find(m => body.includes(m));
    if (hit) return {{ marker: hit }};
    if (location.href.includes('splashui/challenge')) return {{ marker: 'splashui/challenge' }};
    return {{ marker: null }};
}})([{list}])"#
    )
}

/// Document readiness and the number of resources fetched so far.
pub const ACTIVITY: &str = r#"(() => ({
    ready: document.readyState,
    resources: performance.getEntriesByType('resource').length
}))()"#;

/// Escape `s` for use inside a single-quoted JS string literal.
pub fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_escapes_quotes_and_tags() {
        assert_eq!(sanitize_js_string(r#"a'b"c"#), r#"a\'b\"c"#);
        assert_eq!(sanitize_js_string("</script>"), "\\x3c/script\\x3e");
        assert_eq!(sanitize_js_string("x\0y"), "xy");
    }

    #[test]
    fn test_signal_script_embeds_selectors_in_order() {
        let script = read_availability(&[
            SignalSource::text("#qtySubTxt"),
            SignalSource::purchase_control(r#"button[data-testid="art-atc-button"]"#),
        ]);
        let text = script.find("#qtySubTxt").unwrap();
        let button = script.find(r#"button[data-testid=\"art-atc-button\"]"#).unwrap();
        assert!(text < button);
        assert!(script.contains("kind: 'purchase_control'"));
    }

    #[test]
    fn test_challenge_markers_are_lowercased() {
        let script = detect_challenge(&["Pardon Our Interruption".to_string()]);
        assert!(script.contains("'pardon our interruption'"));
    }

    #[test]
    fn test_scripts_target_their_slot() {
        assert!(open_group(3).contains("__stockcheckGroups || [])[3]"));
        assert!(choose_option(1, 7).contains("g.options[7]"));
    }

    #[test]
    fn test_discovery_records_a_locator_per_slot() {
        let script = discover_groups();
        assert!(script.contains("selector: f.selector, ordinal: f.ordinal"));
        assert!(script.contains("scan('div.vim.x-sku', 'listbox'"));
        assert!(script.contains(r#"scan('[data-testid=\"x-msku__group\"]'"#));
    }

    #[test]
    fn test_detached_groups_are_looked_up_again() {
        for script in [open_group(0), list_options(0), choose_option(0, 1), dismiss(0)] {
            assert!(script.contains("if (g && !g.el.isConnected)"));
            assert!(script.contains("document.querySelectorAll(g.selector)[g.ordinal]"));
        }
        assert!(choose_option(0, 1).contains("if (o && !o.isConnected)"));
    }
}
