//! End-to-end dispatch through filters, handlers and file serving

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use gale_core::cache::last_modified;
use gale_core::{
    App, Body, BodyParser, Error, Method, Multipart, ParsedBody, PostParsing, Renderer,
    RequestBuilder, Response, Result, RouteOptions, SessionConfig, SessionRecord, SessionStore,
    Settings, StatusCode, UploadedFile,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn web_root() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), "hello world").unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(dir.path().join("docs/index.html"), "<h1>docs</h1>").unwrap();
    std::fs::create_dir(dir.path().join("empty")).unwrap();
    std::fs::create_dir(dir.path().join("js")).unwrap();
    std::fs::write(dir.path().join("js/app.js"), "console.log(1)").unwrap();
    dir
}

async fn get(app: &App, url: &str) -> Response {
    app.dispatch(RequestBuilder::new(Method::Get, url).build()).await
}

fn text(res: &Response) -> String {
    res.body_string().unwrap_or_default()
}

fn session_cookie(res: &Response) -> Option<String> {
    res.headers()
        .iter()
        .find(|(k, v)| k == "Set-Cookie" && v.starts_with("_wsid="))
        .map(|(_, v)| {
            let pair = v.split(';').next().unwrap_or("");
            pair.trim_start_matches("_wsid=").to_string()
        })
}

#[tokio::test]
async fn test_catch_all_filter_runs_once() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()));
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    app.use_filter(move |ex| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ex.next().await
        }
    });
    app.get("/ping", |ex| async move {
        ex.response().send_text("pong");
        Ok(())
    });

    let res = get(&app, "/ping").await;
    assert_eq!(text(&res), "pong");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    get(&app, "/hello.txt").await;
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_filters_chain_in_order() {
    let app = App::new(Settings::default());
    let log = Arc::new(Mutex::new(Vec::<String>::new()));

    let l = log.clone();
    app.filter("/a", move |ex| {
        let l = l.clone();
        async move {
            l.lock().push("first".into());
            ex.next().await?;
            l.lock().push("first-after".into());
            Ok(())
        }
    });
    let l = log.clone();
    app.filter("/a", move |ex| {
        let l = l.clone();
        async move {
            l.lock().push("second".into());
            ex.next().await
        }
    });
    let l = log.clone();
    app.url("/a/b", move |ex| {
        let l = l.clone();
        async move {
            l.lock().push("handler".into());
            assert!(!ex.has_next());
            ex.response().send_text("done");
            Ok(())
        }
    });

    let res = get(&app, "/a/b").await;
    assert_eq!(text(&res), "done");
    assert_eq!(*log.lock(), vec!["first", "second", "handler", "first-after"]);
}

#[tokio::test]
async fn test_filter_that_does_not_continue_ends_request() {
    let app = App::new(Settings::default());
    let reached = Arc::new(AtomicUsize::new(0));

    app.filter("/admin", |ex| async move {
        ex.response().redirect("/login");
        Ok(())
    });
    let r = reached.clone();
    app.url("/admin", move |_ex| {
        let r = r.clone();
        async move {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let res = get(&app, "/admin/users").await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.header("Location"), Some("/login"));
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_first_matching_handler_wins() {
    let app = App::new(Settings::default());
    app.get_with("/user/:id", "first", RouteOptions::new())
        .get_with("/user/:id", "second", RouteOptions::new());

    let res = get(&app, "/user/7").await;
    assert_eq!(text(&res), "first");
}

#[tokio::test]
async fn test_handler_params() {
    let app = App::new(Settings::default());
    app.get("/user/:id", |ex| async move {
        let id = ex.request().param("id").unwrap_or("").to_string();
        ex.response().send_text(format!("user {}", id));
        Ok(())
    });

    let res = get(&app, "/user/a%20b").await;
    assert_eq!(text(&res), "user a b");

    // strict GET handler does not match a deeper url
    let res = get(&app, "/user/7/extra").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_literal_handler() {
    let app = App::new(Settings::default());
    app.url_with("/lit", "<b>hi</b>", RouteOptions::new());

    let res = get(&app, "/lit").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(text(&res), "<b>hi</b>");
    assert!(res.content_type().unwrap().starts_with("text/html"));
}

#[tokio::test]
async fn test_pre_check_rejects() {
    let app = App::new(Settings::default());
    app.url_with(
        "/guarded",
        Body::func(|ex| async move {
            ex.response().send_text("secret");
            Ok(())
        }),
        RouteOptions::new().before(|req, _res| req.header("x-token") == Some("ok")),
    );

    let res = get(&app, "/guarded").await;
    assert_eq!(text(&res), gale_core::REJECTION_BODY);

    let req = RequestBuilder::new(Method::Get, "/guarded").header("X-Token", "ok").build();
    let res = app.dispatch(req).await;
    assert_eq!(text(&res), "secret");
}

#[tokio::test]
async fn test_form_post() {
    let app = App::new(Settings::default());
    app.post("/form", |ex| async move {
        let name = {
            let req = ex.request();
            req.parsed.as_ref().and_then(|p| p.field("name")).unwrap_or_default()
        };
        ex.response().send_text(name);
        Ok(())
    });

    let req = RequestBuilder::new(Method::Post, "/form").body("name=gale&x=1").build();
    let res = app.dispatch(req).await;
    assert_eq!(text(&res), "gale");
}

#[tokio::test]
async fn test_json_handler() {
    let app = App::new(Settings::default());
    app.json("/api/echo", |ex| async move {
        let value = {
            let req = ex.request();
            req.parsed.as_ref().and_then(|p| p.as_json()).cloned()
        };
        ex.response().send_json(&value)?;
        Ok(())
    });

    let req = RequestBuilder::new(Method::Post, "/api/echo").body(r#"{"a":1}"#).build();
    let res = app.dispatch(req).await;
    assert_eq!(text(&res), r#"{"a":1}"#);
    assert!(res.content_type().unwrap().starts_with("application/json"));
}

#[tokio::test]
async fn test_error_page() {
    let app = App::new(Settings::default().show_error(true));
    app.url("/fail", |_ex| async move { Err(Error::body("database down")) });

    let res = get(&app, "/fail").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = text(&res);
    assert!(body.starts_with("<pre>Error "));
    assert!(body.contains("/fail"));
    assert!(body.contains("database down"));
}

#[tokio::test]
async fn test_error_page_hidden() {
    let app = App::new(Settings::default().show_error(false));
    app.url("/fail", |_ex| async move { Err(Error::body("database down")) });

    let res = get(&app, "/fail").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&res).is_empty());
}

#[tokio::test]
async fn test_panic_is_contained() {
    let app = App::new(Settings::default());
    app.url("/boom", |_ex| async move {
        if true {
            panic!("boom");
        }
        Ok(())
    });
    app.url_with("/ok", "fine", RouteOptions::new());

    let res = get(&app, "/boom").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&res).contains("panic: boom"));

    let res = get(&app, "/ok").await;
    assert_eq!(text(&res), "fine");
}

#[tokio::test]
async fn test_unended_response_is_flushed() {
    let app = App::new(Settings::default());
    app.url("/partial", |ex| async move {
        ex.response().write("partial");
        Ok(())
    });

    let res = get(&app, "/partial").await;
    assert!(res.is_finished());
    assert_eq!(text(&res), "partial");
}

#[tokio::test]
async fn test_new_session_sets_cookie() {
    let app = App::new(Settings::default());
    app.session(
        "/",
        |ex| async move {
            let has = ex.request().session.is_some();
            ex.response().send_text(if has { "yes" } else { "no" });
            Ok(())
        },
        RouteOptions::new(),
    );

    let res = get(&app, "/").await;
    assert_eq!(text(&res), "yes");
    let id = session_cookie(&res).expect("session cookie");
    assert_eq!(id.len(), 36);
    assert!(res
        .headers()
        .iter()
        .any(|(k, v)| k == "Set-Cookie" && v.contains("path=/") && v.contains("httponly")));
}

#[tokio::test]
async fn test_session_persists_between_requests() {
    let app = App::new(Settings::default());
    app.url_with(
        "/count",
        Body::func(|ex| async move {
            let n = {
                let mut req = ex.request();
                let session = req.session.get_or_insert_with(Default::default);
                let n = session.get("n").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
                session.set("n", n);
                n
            };
            ex.response().send_text(n.to_string());
            Ok(())
        }),
        RouteOptions::new().session(true),
    );

    let res = get(&app, "/count").await;
    assert_eq!(text(&res), "1");
    let id = session_cookie(&res).unwrap();

    let req = RequestBuilder::new(Method::Get, "/count")
        .header("Cookie", format!("_wsid={}", id))
        .build();
    let res = app.dispatch(req).await;
    assert_eq!(text(&res), "2");
    assert!(session_cookie(&res).is_none());
}

#[tokio::test]
async fn test_file_store_selected_by_session_dir() {
    let sessions = tempfile::tempdir().unwrap();
    let settings = Settings::default().session(SessionConfig::new().dir(sessions.path()));
    let app = App::new(settings);
    app.session(
        "/",
        |ex| async move {
            ex.response().send_text("ok");
            Ok(())
        },
        RouteOptions::new(),
    );

    let res = get(&app, "/").await;
    let id = session_cookie(&res).unwrap();
    let saved = std::fs::read_to_string(sessions.path().join(&id)).unwrap();
    assert!(saved.contains("__lastAccessTime"));
}

#[tokio::test]
async fn test_static_file_and_not_modified() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()).file_cache_size(1024));

    let res = get(&app, "/hello.txt").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(text(&res), "hello world");
    assert!(res.content_type().unwrap().starts_with("text/plain"));
    let modified = res.header("Last-Modified").unwrap().to_string();
    assert!(res.header("ETag").is_some());
    assert_eq!(app.files().cache().len(), 1);

    let req = RequestBuilder::new(Method::Get, "/hello.txt")
        .header("If-Modified-Since", modified)
        .build();
    let res = app.dispatch(req).await;
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn test_cached_gzip() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()).file_cache_size(1024));
    get(&app, "/hello.txt").await;

    let req = RequestBuilder::new(Method::Get, "/hello.txt")
        .header("Accept-Encoding", "gzip, deflate")
        .build();
    let res = app.dispatch(req).await;
    assert_eq!(res.header("Content-Encoding"), Some("gzip"));

    let mut decoded = String::new();
    flate2::read::GzDecoder::new(res.body())
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, "hello world");

    let res = get(&app, "/hello.txt").await;
    assert_eq!(res.header("Content-Encoding"), None);
    assert_eq!(text(&res), "hello world");
}

#[tokio::test]
async fn test_default_page_redirect() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()));

    let res = get(&app, "/docs").await;
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.header("Location"), Some("/docs/"));

    let res = get(&app, "/docs/").await;
    assert_eq!(text(&res), "<h1>docs</h1>");
}

#[tokio::test]
async fn test_not_found_and_forbidden() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()));

    let res = get(&app, "/missing.html").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(text(&res), gale_core::NOT_FOUND_BODY);

    let res = get(&app, "/empty/").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(text(&res), gale_core::FORBIDDEN_BODY);

    let res = get(&app, "/../etc/passwd").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_directory_listing() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()).list_dir(true));

    let res = get(&app, "/empty/").await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(text(&res).contains("Count: 0"));
}

#[tokio::test]
async fn test_static_prefix_skips_filters() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()));
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    app.use_filter(move |ex| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            ex.next().await
        }
    });
    app.static_prefix("/js/");

    let res = get(&app, "/js/app.js").await;
    assert_eq!(text(&res), "console.log(1)");
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_module_home() {
    let root = web_root();
    let module = tempfile::tempdir().unwrap();
    std::fs::write(module.path().join("page.html"), "module page").unwrap();

    let app = App::new(Settings::new(root.path()));
    app.module("shop", module.path());

    let res = get(&app, "/shop/page.html").await;
    assert_eq!(text(&res), "module page");
}

#[tokio::test]
async fn test_handler_serves_file_reference() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()));
    app.url_with("/greeting", Body::file("/hello.txt"), RouteOptions::new());

    let res = get(&app, "/greeting").await;
    assert_eq!(text(&res), "hello world");
}

#[tokio::test]
async fn test_render_without_renderer_fails() {
    let app = App::new(Settings::default());
    app.url("/page", |ex| async move { ex.render("page", &serde_json::json!({})).await });

    let res = get(&app, "/page").await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&res).contains("no renderer configured"));
}

struct FailingStore;

impl SessionStore for FailingStore {
    fn get<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, Result<Option<SessionRecord>>> {
        future::ready(Err(Error::Store("backend offline".into()))).boxed()
    }

    fn set<'a>(&'a self, _id: &'a str, _record: SessionRecord) -> BoxFuture<'a, Result<()>> {
        future::ready(Err(Error::Store("backend offline".into()))).boxed()
    }

    fn del<'a>(&'a self, _id: &'a str) -> BoxFuture<'a, Result<()>> {
        future::ready(Err(Error::Store("backend offline".into()))).boxed()
    }
}

#[tokio::test]
async fn test_store_failure_still_answers() {
    let app = App::builder(Settings::default())
        .session_store(Arc::new(FailingStore))
        .build();
    app.session(
        "/",
        |ex| async move {
            let has = ex.request().session.is_some();
            ex.response().send_text(if has { "session" } else { "none" });
            Ok(())
        },
        RouteOptions::new(),
    );

    let stale = "x".repeat(36);
    let req = RequestBuilder::new(Method::Get, "/")
        .header("Cookie", format!("_wsid={}", stale))
        .build();
    let res = app.dispatch(req).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(text(&res), "session");
    let minted = session_cookie(&res).expect("new session cookie");
    assert_eq!(minted.len(), 36);
    assert_ne!(minted, stale);
}

/// Records which parser entry points ran
#[derive(Default)]
struct UploadParser {
    calls: Mutex<Vec<&'static str>>,
}

impl BodyParser for UploadParser {
    fn parse(&self, body: &[u8], _mode: PostParsing) -> Result<ParsedBody> {
        self.calls.lock().push("parse");
        Ok(ParsedBody::Text(String::from_utf8_lossy(body).into_owned()))
    }

    fn parse_multipart(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        upload_dir: &Path,
    ) -> Result<Multipart> {
        self.calls.lock().push("multipart");
        assert!(content_type.unwrap_or("").starts_with("multipart/form-data"));

        let mut fields = HashMap::new();
        fields.insert("title".to_string(), "report".to_string());
        Ok(Multipart {
            fields,
            files: vec![UploadedFile {
                field: "doc".into(),
                name: "report.pdf".into(),
                path: upload_dir.join("upload_1"),
                size: body.len() as u64,
                content_type: Some("application/pdf".into()),
            }],
        })
    }
}

#[tokio::test]
async fn test_upload_filter_pre_processing() {
    let parser = Arc::new(UploadParser::default());
    let app = App::builder(Settings::default()).body_parser(parser.clone()).build();

    app.file(
        "/upload",
        |ex| async move {
            let (title, files, has_session) = {
                let req = ex.request();
                let title = req.parsed.as_ref().and_then(|p| p.field("title"));
                (title, req.files.len(), req.session.is_some())
            };
            ex.response().send_text(format!("{:?} {} {}", title, files, has_session));
            Ok(())
        },
        RouteOptions::new().post(PostParsing::Raw),
    );

    let req = RequestBuilder::new(Method::Post, "/upload")
        .header("Content-Type", "multipart/form-data; boundary=xyz")
        .body("--xyz--")
        .build();
    let res = app.dispatch(req).await;

    assert_eq!(text(&res), r#"Some("report") 1 true"#);
    // the multipart result counts as the parsed body
    assert_eq!(*parser.calls.lock(), vec!["multipart"]);
    assert!(session_cookie(&res).is_some());
}

#[tokio::test]
async fn test_upload_without_parser_support_fails() {
    let app = App::new(Settings::default());
    app.file(
        "/upload",
        |ex| async move {
            ex.response().send_text("unreachable");
            Ok(())
        },
        RouteOptions::new(),
    );

    let req = RequestBuilder::new(Method::Post, "/upload").body("--xyz--").build();
    let res = app.dispatch(req).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!text(&res).contains("unreachable"));
}

struct NameRenderer;

impl Renderer for NameRenderer {
    fn render<'a>(
        &'a self,
        template: &'a str,
        model: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<Bytes>> {
        let html = format!("<h1>{}</h1>{}", template, model);
        future::ready(Ok(Bytes::from(html))).boxed()
    }
}

#[tokio::test]
async fn test_not_found_template() {
    let root = web_root();
    let settings = Settings::new(root.path()).not_found_template("404.html");
    let app = App::builder(settings).renderer(Arc::new(NameRenderer)).build();

    let res = get(&app, "/missing.html").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(text(&res), "<h1>404.html</h1>null");

    app.url("/page", |ex| async move {
        ex.render("page.html", &serde_json::json!({"n": 1})).await
    });
    let res = get(&app, "/page").await;
    assert_eq!(text(&res), r#"<h1>page.html</h1>{"n":1}"#);
}

#[tokio::test]
async fn test_not_modified_without_cache() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()).file_cache_size(0));

    let res = get(&app, "/hello.txt").await;
    let modified = res.header("Last-Modified").unwrap().to_string();
    assert!(app.files().cache().is_empty());

    let req = RequestBuilder::new(Method::Get, "/hello.txt")
        .header("If-Modified-Since", modified)
        .build();
    let res = app.dispatch(req).await;
    assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
    assert!(res.body().is_empty());
}

#[tokio::test]
async fn test_conditional_get_outside_window() {
    let root = web_root();
    let mtime = std::fs::metadata(root.path().join("hello.txt"))
        .unwrap()
        .modified()
        .unwrap();

    for cache_size in [0, 1024] {
        let app = App::new(Settings::new(root.path()).file_cache_size(cache_size));
        get(&app, "/hello.txt").await;

        for since in [
            last_modified(mtime + Duration::from_secs(2)),
            last_modified(mtime - Duration::from_secs(2)),
            "Fri, 01 Jan 2100 00:00:00 GMT".to_string(),
        ] {
            let req = RequestBuilder::new(Method::Get, "/hello.txt")
                .header("If-Modified-Since", since.as_str())
                .build();
            let res = app.dispatch(req).await;
            assert_eq!(res.status(), StatusCode::OK, "cache {} since {}", cache_size, since);
            assert_eq!(text(&res), "hello world");
        }
    }
}

#[tokio::test]
async fn test_extension_method_skips_get_handler() {
    let root = web_root();
    let app = App::new(Settings::new(root.path()));
    app.get("/admin", |ex| async move {
        ex.response().send_text("GET handler ran");
        Ok(())
    });

    let req = RequestBuilder::new(Method::Other("PURGE".into()), "/admin").build();
    let res = app.dispatch(req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(!text(&res).contains("GET handler ran"));
}

#[tokio::test]
async fn test_literal_body_answers_directly() {
    let app = App::new(Settings::default());
    app.url_with(
        "/notice",
        "<p>closed</p>",
        RouteOptions::new().before(|_req, _res| false).session(true),
    );

    let res = get(&app, "/notice").await;
    assert_eq!(text(&res), "<p>closed</p>");
    assert!(session_cookie(&res).is_none());
}
