//! Page-side scripts for the CDP backend.
//!
//! Every command is one `evaluate` of a [`program`]: a prelude that resolves
//! the active frame path to a document, then a command body. Bodies return a
//! reply object `{ status, value?, message? }` which the prelude serialises
//! with `JSON.stringify`, so `undefined` never crosses the wire.

use serde::Deserialize;
use serde_json::Value;

/// Attribute stamped on every node handed out as an element reference.
pub const REF_ATTR: &str = "data-eoka-ref";

const HEAD: &str = r#"JSON.stringify(((frames, args) => {
    const ATTR = 'data-eoka-ref';
    const win = window;
    const ok = (value) => ({ status: 'ok', value: value === undefined ? null : value });
    const fail = (status, message) => ({ status, message });

    if (!win.__eokaToken) {
        win.__eokaToken = Math.random().toString(36).slice(2, 10);
        win.__eokaSeq = 0;
    }
    function refOf(el) {
        let id = el.getAttribute(ATTR);
        if (!id || !id.startsWith(win.__eokaToken + '-')) {
            id = win.__eokaToken + '-' + (++win.__eokaSeq);
            el.setAttribute(ATTR, id);
        }
        return id;
    }
    const byRef = (d, id) => d.querySelector('[' + ATTR + '="' + id + '"]');

    let doc = document;
    for (const id of frames) {
        const frame = byRef(doc, id);
        let inner = null;
        try { inner = frame && frame.contentDocument; } catch (e) { inner = null; }
        if (!inner) return fail('no_frame', 'frame ' + id + ' is gone or cross-origin');
        doc = inner;
    }

    function element(id) {
        const el = byRef(doc, id);
        if (!el) throw fail('stale', 'element ' + id + ' is no longer attached to the document');
        return el;
    }

    function visible(el) {
        if (!el.isConnected) return false;
        if (el.tagName === 'OPTION') {
            const list = el.closest('select');
            return list ? visible(list) : true;
        }
        if (el.tagName === 'INPUT' && el.type === 'hidden') return false;
        const view = el.ownerDocument.defaultView;
        for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
            const s = view.getComputedStyle(n);
            if (s.display === 'none' || s.visibility === 'hidden' || s.opacity === '0') return false;
        }
        const r = el.getBoundingClientRect();
        return r.width > 0 && r.height > 0;
    }

    function disabled(el) {
        if (el.disabled) return true;
        const list = el.tagName === 'OPTION' ? el.closest('select') : null;
        return !!(list && list.disabled);
    }

    function editable(el) {
        if (el.isContentEditable || el.tagName === 'TEXTAREA') return true;
        if (el.tagName !== 'INPUT') return false;
        return !['checkbox', 'radio', 'button', 'submit', 'reset', 'image', 'file', 'hidden', 'range', 'color']
            .includes(el.type);
    }

    function interactable(el) {
        if (!visible(el)) throw fail('not_interactable', 'element is not displayed');
        if (disabled(el)) throw fail('not_interactable', 'element is disabled');
    }

    try {
"#;

const TAIL: &str = r#"
    } catch (e) {
        if (e && e.status) return e;
        return fail('script_error', String((e && e.message) || e));
    }
})("#;

/// Assemble a complete evaluate expression from a command body.
pub fn program(body: &str, frames: &[String], args: &Value) -> String {
    let frames = serde_json::to_string(frames).unwrap_or_else(|_| "[]".into());
    let args = serde_json::to_string(args).unwrap_or_else(|_| "{}".into());
    let mut js = String::with_capacity(HEAD.len() + body.len() + TAIL.len() + args.len() + 16);
    js.push_str(HEAD);
    js.push_str(body);
    js.push_str(TAIL);
    js.push_str(&frames);
    js.push_str(", ");
    js.push_str(&args);
    js.push_str("))");
    js
}

/// What every program evaluates to.
#[derive(Debug, Deserialize)]
pub struct Reply {
    pub status: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub message: Option<String>,
}

// --- command bodies; `args` fields are documented next to each ---

/// `{ by, value, scope? }` → array of refs in document order.
pub const FIND: &str = r#"
        const root = args.scope ? element(args.scope) : doc;
        const v = args.value;
        const q = (sel) => Array.from(root.querySelectorAll(sel));
        const linkText = (a) => (a.innerText || a.textContent || '').trim();
        let found = [];
        try {
            switch (args.by) {
                case 'id': found = q('[id="' + CSS.escape(v) + '"]'); break;
                case 'name': found = q('[name="' + CSS.escape(v) + '"]'); break;
                case 'class': found = q('.' + CSS.escape(v)); break;
                case 'css': found = q(v); break;
                case 'tag': found = q(v); break;
                case 'link_text': found = q('a').filter(a => linkText(a) === v); break;
                case 'partial_link_text': found = q('a').filter(a => linkText(a).includes(v)); break;
                case 'xpath': {
                    const snap = doc.evaluate(v, root, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                    for (let i = 0; i < snap.snapshotLength; i++) {
                        const n = snap.snapshotItem(i);
                        if (n.nodeType === 1) found.push(n);
                    }
                    break;
                }
                default: return fail('invalid_selector', 'unknown strategy ' + args.by);
            }
        } catch (e) {
            return fail('invalid_selector', String((e && e.message) || e));
        }
        return ok(found.map(refOf));
"#;

/// `{ ref, native }` → `'native'` when the caller should dispatch a real
/// click on the ref selector, `'done'` when the page already handled it.
pub const CLICK: &str = r#"
        const el = element(args.ref);
        if (el.tagName === 'OPTION') {
            if (disabled(el)) return fail('not_interactable', 'option is disabled');
            const list = el.closest('select');
            el.selected = list && list.multiple ? !el.selected : true;
            if (list) {
                list.dispatchEvent(new Event('input', { bubbles: true }));
                list.dispatchEvent(new Event('change', { bubbles: true }));
            }
            return ok('done');
        }
        interactable(el);
        el.scrollIntoView({ block: 'center', inline: 'center' });
        if (args.native) return ok('native');
        el.click();
        return ok('done');
"#;

/// `{ ref, text }`: focus with the caret at the end so typing appends.
pub const FOCUS: &str = r#"
        const el = element(args.ref);
        interactable(el);
        if (args.text) {
            if (!editable(el)) return fail('not_interactable', 'element does not accept text');
            if (el.readOnly) return fail('not_interactable', 'element is read-only');
        }
        el.focus();
        if (args.text && typeof el.selectionStart === 'number') {
            try { el.setSelectionRange(el.value.length, el.value.length); } catch (e) {}
        }
        return ok(null);
"#;

/// `{ ref }`
pub const CLEAR: &str = r#"
        const el = element(args.ref);
        interactable(el);
        if (!editable(el) || el.readOnly) return fail('not_interactable', 'element is not editable');
        if (el.isContentEditable) el.textContent = '';
        else el.value = '';
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return ok(null);
"#;

/// `{ ref }` → `{ x, y }` centre in top-level viewport coordinates.
pub const POINT: &str = r#"
        const el = element(args.ref);
        interactable(el);
        el.scrollIntoView({ block: 'center', inline: 'center' });
        const r = el.getBoundingClientRect();
        let x = r.left + r.width / 2;
        let y = r.top + r.height / 2;
        let view = el.ownerDocument.defaultView;
        while (view.frameElement) {
            const f = view.frameElement.getBoundingClientRect();
            x += f.left;
            y += f.top;
            view = view.parent;
        }
        return ok({ x, y });
"#;

/// `{ ref, gesture: 'context' | 'double' }`
pub const GESTURE: &str = r#"
        const el = element(args.ref);
        interactable(el);
        const view = el.ownerDocument.defaultView;
        const r = el.getBoundingClientRect();
        const base = { bubbles: true, cancelable: true, view, clientX: r.left + r.width / 2, clientY: r.top + r.height / 2 };
        const fire = (type, extra) => el.dispatchEvent(new view.MouseEvent(type, Object.assign({}, base, extra)));
        if (args.gesture === 'context') {
            fire('mousedown', { button: 2, buttons: 2 });
            fire('mouseup', { button: 2 });
            fire('contextmenu', { button: 2 });
        } else {
            for (const detail of [1, 2]) {
                fire('mousedown', { detail, buttons: 1 });
                fire('mouseup', { detail });
                fire('click', { detail });
            }
            fire('dblclick', { detail: 2 });
        }
        return ok(null);
"#;

/// `{ source, target }`: HTML5 drag sequence plus the mouse events
/// pointer-based drag libraries listen for.
pub const DRAG: &str = r#"
        const src = element(args.source);
        const dst = element(args.target);
        interactable(src);
        interactable(dst);
        const view = src.ownerDocument.defaultView;
        const centre = (el) => {
            const r = el.getBoundingClientRect();
            return { clientX: r.left + r.width / 2, clientY: r.top + r.height / 2 };
        };
        const mouse = (el, type, extra) => el.dispatchEvent(
            new view.MouseEvent(type, Object.assign({ bubbles: true, cancelable: true, view }, centre(el), extra)));
        const data = new view.DataTransfer();
        const drag = (el, type, at) => el.dispatchEvent(
            new view.DragEvent(type, Object.assign({ bubbles: true, cancelable: true, view, dataTransfer: data }, centre(at))));
        mouse(src, 'mousedown', { button: 0, buttons: 1 });
        drag(src, 'dragstart', src);
        drag(dst, 'dragenter', dst);
        drag(dst, 'dragover', dst);
        mouse(dst, 'mousemove', { buttons: 1 });
        drag(dst, 'drop', dst);
        drag(src, 'dragend', dst);
        mouse(dst, 'mouseup', { button: 0 });
        return ok(null);
"#;

/// `{ ref, query: 'text' | 'tag' | 'selected' | 'displayed' | 'enabled' | 'attribute' | 'css', name? }`
pub const READ: &str = r#"
        const el = element(args.ref);
        switch (args.query) {
            case 'text': {
                if (!visible(el)) return ok('');
                const t = el.tagName === 'OPTION' ? el.textContent : el.innerText;
                return ok((t || '').trim());
            }
            case 'tag': return ok(el.tagName.toLowerCase());
            case 'selected': return ok(!!(el.checked || el.selected));
            case 'displayed': return ok(visible(el));
            case 'enabled': return ok(!disabled(el));
            case 'css':
                return ok(el.ownerDocument.defaultView.getComputedStyle(el).getPropertyValue(args.name));
            case 'attribute': {
                const name = args.name;
                const lower = name.toLowerCase();
                if (lower === 'checked' || lower === 'selected') return ok(el[lower] ? 'true' : null);
                if (['disabled', 'readonly', 'multiple', 'required', 'hidden', 'autofocus'].includes(lower)) {
                    return ok(el.hasAttribute(lower) ? 'true' : null);
                }
                if (name in el) {
                    const prop = el[name];
                    if (prop !== null && prop !== undefined && typeof prop !== 'object' && typeof prop !== 'function') {
                        return ok(String(prop));
                    }
                }
                return ok(el.getAttribute(name));
            }
            default: return fail('script_error', 'unknown query ' + args.query);
        }
"#;

/// `{ script, args }`
pub const SCRIPT: &str = r#"
        const view = doc.defaultView;
        const fn = new view.Function(args.script);
        return ok(fn.apply(view, args.args));
"#;

/// `{ ref? , index?, name? }` → ref of the frame element.
pub const FRAME: &str = r#"
        const candidates = () => Array.from(doc.querySelectorAll('iframe, frame'));
        let frame = null;
        if (args.ref) frame = element(args.ref);
        else if (typeof args.index === 'number') frame = candidates()[args.index] || null;
        else if (args.name) frame = candidates().find(f => f.name === args.name || f.id === args.name) || null;
        if (!frame || !['IFRAME', 'FRAME'].includes(frame.tagName)) return fail('no_frame', 'no frame matches');
        let inner = null;
        try { inner = frame.contentDocument; } catch (e) { inner = null; }
        if (!inner) return fail('no_frame', 'frame is cross-origin or not loaded');
        return ok(refOf(frame));
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_embeds_frames_and_args() {
        let js = program(FIND, &["abc-1".to_string()], &serde_json::json!({"by": "id", "value": "q"}));
        assert!(js.starts_with("JSON.stringify(((frames, args) => {"));
        assert!(js.ends_with(r#"})(["abc-1"], {"by":"id","value":"q"}))"#));
        assert!(js.contains("case 'partial_link_text'"));
    }

    #[test]
    fn args_are_json_escaped() {
        let js = program(SCRIPT, &[], &serde_json::json!({"script": "return \"x\"</script>"}));
        assert!(js.contains(r#"{"script":"return \"x\"</script>"}"#));
    }

    #[test]
    fn ref_attr_matches_prelude() {
        assert!(HEAD.contains(&format!("const ATTR = '{}'", REF_ATTR)));
    }

    #[test]
    fn reply_defaults() {
        let r: Reply = serde_json::from_str(r#"{"status":"stale","message":"gone"}"#).unwrap();
        assert_eq!(r.status, "stale");
        assert!(r.value.is_null());
        assert_eq!(r.message.as_deref(), Some("gone"));
    }
}
