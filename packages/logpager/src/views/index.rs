use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use maud::{DOCTYPE, PreEscaped, html};

use super::CSS;
use crate::AppState;

const SCRIPT: &str = r#"
const page = document.getElementById('page');
const search = document.getElementById('search');
const modeBadge = document.getElementById('mode');
const statusLine = document.getElementById('status');
const scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
const ws = new WebSocket(scheme + location.host + '/log');
let mode = 'SCROLL';

function send(type, message) {
    if (ws.readyState === WebSocket.OPEN) {
        ws.send(JSON.stringify({ type, message }));
    }
}

function setMode(next) {
    if (mode === next) return;
    mode = next;
    modeBadge.textContent = next;
    modeBadge.classList.toggle('search', next === 'SEARCH');
    send('MODE_CTL', next);
}

ws.onopen = () => { statusLine.textContent = 'connected'; };
ws.onclose = () => { statusLine.textContent = 'disconnected'; };
ws.onmessage = (event) => {
    page.textContent = event.data;
    window.scrollTo(0, 0);
};

document.addEventListener('keydown', (event) => {
    if (event.key === 'Escape') {
        search.blur();
        setMode('SCROLL');
        return;
    }
    if (document.activeElement === search) return;
    if (['j', 'k', 'J', 'K'].includes(event.key)) {
        event.preventDefault();
        setMode('SCROLL');
        send('KEY', event.key);
    } else if (event.key === '/') {
        event.preventDefault();
        search.focus();
    }
});

search.addEventListener('focus', () => setMode('SEARCH'));
search.addEventListener('keydown', (event) => {
    if (event.key === 'Enter') {
        setMode('SEARCH');
        send('SEARCH_VAL', search.value);
    }
});

window.addEventListener('beforeunload', () => send('CLOSE', ''));
"#;

pub async fn index_page(State(state): State<AppState>) -> impl IntoResponse {
    let target = state.target.to_string();
    let markup = html! {
        (DOCTYPE)
        html {
            head {
                title { "logpager - " (target) }
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                style { (PreEscaped(CSS)) }
            }
            body {
                header {
                    strong { "logpager" }
                    span class="target" { (target) }
                    input id="search" type="text" placeholder="/ to search, Enter to run";
                    span id="mode" class="mode" { "SCROLL" }
                }
                pre id="page" {}
                div id="status" { "connecting" }
                script { (PreEscaped(SCRIPT)) }
            }
        }
    };

    Html(markup.into_string())
}

#[cfg(test)]
mod tests {
    use crate::backend::Target;
    use crate::test_helpers::test_app_state;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_index_page_names_target() {
        let target: Target = "ops@logs.internal:2222:/var/log/app.log".parse().unwrap();
        let app = crate::create_router(test_app_state(target));

        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("ops@logs.internal:2222:/var/log/app.log"));
        assert!(html.contains("MODE_CTL"));
    }
}
