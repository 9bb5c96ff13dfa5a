//! The web interface
//!
//! One analysis session behind a read-write lock; request handlers
//! serialize on it, so one request runs to completion before the next
//! mutation. The exit endpoints flip a watch channel that drives the
//! server's graceful shutdown, after which pending renames have already
//! been applied (`sexit`) or dropped (`qexit`).

use crate::core::config::{Config, DisplayConfig, RewriteConfig};
use crate::core::error::{Error, Result};
use crate::ec::eclass::EcId;
use crate::graph::call::CallId;
use crate::metrics::id::IdSummary;
use crate::metrics::MetricSummary;
use crate::post::identifier::IdProp;
use crate::source::fileid::FileId;
use crate::source::tokid::Tokid;
use crate::web::pages;
use crate::workspace::{Analysis, PostResult};
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::info;

/// Everything the web phase reads, plus the two things it may mutate:
/// per-identifier replacement strings and the display options.
pub struct Session {
    pub cx: Analysis,
    pub ids: IdProp,
    pub id_sum: IdSummary,
    pub file_sum: MetricSummary,
    pub fun_sum: MetricSummary,
    pub opts: DisplayConfig,
    pub hooks: RewriteConfig,
    pub current_project: Option<usize>,
}

impl Session {
    pub fn new(cx: Analysis, post: PostResult, config: &Config) -> Self {
        Self {
            cx,
            ids: post.ids,
            id_sum: post.id_sum,
            file_sum: post.file_sum,
            fun_sum: post.fun_sum,
            opts: config.display.clone(),
            hooks: config.rewrite.clone(),
            current_project: None,
        }
    }

    pub fn project_note(&self) -> Option<String> {
        self.current_project
            .and_then(|p| self.cx.projects.name_of(p))
            .map(str::to_string)
    }

    /// Resolve the `id` parameter to a live identifier class.
    pub fn ec_param(&self, params: &HashMap<String, String>) -> Option<EcId> {
        let raw: u32 = params.get("id")?.parse().ok()?;
        let root = self.cx.ecs.resolve(raw)?;
        self.ids.contains_key(&root).then_some(root)
    }

    /// Resolve the `id` parameter to a file.
    pub fn file_param(&self, params: &HashMap<String, String>) -> Option<FileId> {
        let raw: u32 = params.get("id")?.parse().ok()?;
        let fid = FileId(raw);
        self.cx.files.lookup(fid).map(|_| fid)
    }

    /// Resolve the `f` parameter to a call-graph node.
    pub fn call_param(&self, params: &HashMap<String, String>) -> Option<CallId> {
        let raw: u32 = params.get("f")?.parse().ok()?;
        self.cx.calls.resolve(raw)
    }

    pub fn line_of(&self, t: Tokid) -> usize {
        self.cx.files.get(t.file).line_number(t.offset)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<Session>>,
    pub shutdown: Arc<watch::Sender<bool>>,
}

/// Serve the analysis until an exit endpoint fires.
pub async fn serve(session: Session, port: u16) -> Result<()> {
    let (tx, mut rx) = watch::channel(false);
    let state = AppState {
        session: Arc::new(RwLock::new(session)),
        shutdown: Arc::new(tx),
    };

    let app = Router::new()
        .route("/", get(pages::index::index_page))
        .route("/index.html", get(pages::index::index_page))
        .route("/file.html", get(pages::files::file_page))
        .route("/src.html", get(pages::files::src_page))
        .route("/qsrc.html", get(pages::files::qsrc_page))
        .route("/iquery.html", get(pages::queries::iquery_page))
        .route("/xiquery.html", get(pages::queries::xiquery_page))
        .route("/fquery.html", get(pages::queries::fquery_page))
        .route("/xfquery.html", get(pages::queries::xfquery_page))
        .route("/funquery.html", get(pages::queries::funquery_page))
        .route("/xfunquery.html", get(pages::queries::xfunquery_page))
        .route(
            "/id.html",
            get(pages::ident::id_page).post(pages::ident::id_set_name),
        )
        .route("/fun.html", get(pages::funs::fun_page))
        .route("/funlist.html", get(pages::funs::funlist_page))
        .route("/cgraph.html", get(pages::funs::cgraph_page))
        .route("/qinc.html", get(pages::qinc::qinc_page))
        .route("/sproject.html", get(pages::admin::sproject_page))
        .route("/setproj.html", get(pages::admin::setproj_page))
        .route("/options.html", get(pages::admin::options_page))
        .route("/soptions.html", post(pages::admin::soptions_page))
        .route("/sexit.html", get(pages::admin::sexit_page))
        .route("/qexit.html", get(pages::admin::qexit_page))
        .route("/fmetrics.html", get(pages::admin::fmetrics_page))
        .route("/idmetrics.html", get(pages::admin::idmetrics_page))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config {
            message: format!("cannot serve on port {port}: {e}"),
        })?;
    info!("we are now ready to serve you at http://localhost:{port}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = rx.changed().await;
    })
    .await?;
    Ok(())
}
