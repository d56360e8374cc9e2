/*!
# datachat

A small multi-user web application for asking questions about tabular data,
built in Rust.

## Overview

Users register, log in, upload CSV / TXT / XLS / XLSX files and pick one as
their active dataset. The dataset is then queried through a chat box that
understands a fixed set of commands. Anything the command table does not
recognise is forwarded, together with a small sample of the data, to an
external chat-completion service.

## Architecture

### Web Layer
- **Technologies**: Rust, axum, tokio
- **Key Components**:
  - Router - public account routes and cookie-protected data routes
  - Sessions - signed `session` cookie mapped to server-side session state
  - Upload / selection handlers - per-user file ownership checks

### Data Layer
- **Key Components**:
  - Loader - CSV and Excel files into a [`table::DataFrame`]
  - DataFrame - dtype inference, `describe`, means and HTML rendering
  - Pager - 50-row pages over a dataset
  - Session cache - gzip + bincode snapshot of the last materialized dataset
  - Graphs - histograms rendered to PNG with plotters

### Persistence Layer
- SQLite through sqlx: `users` and `files` tables
- Raw uploads in the upload directory, one file per name

## Chat Commands

| Message | Result |
|---------|--------|
| `show head` | first 5 rows, or page 1 when the data spans several pages |
| `show shape` | row and column counts |
| `describe data` | summary statistics for every column |
| `show me the average` | means of the numeric columns |
| `show all data` | page 1 of the full dataset |
| `show page N` | page N of the cached dataset |
| `plot histogram <column>` | PNG histogram of a numeric column |

## Modules

- **config**: Environment-driven settings and fixed limits
- **table**: DataFrame type and its operations
- **loader**: Data file parsing and filename validation
- **pager**: Page arithmetic and page rendering
- **cache**: Per-session dataset snapshots
- **commands**: Chat command parsing and execution
- **graph**: Histogram generation
- **downloader**: Export functionality (CSV, XLSX)
- **db**: Users and file records (web feature)
- **login**: Authentication and session management (web feature)
- **ai**: Chat-completion client (web feature)
- **app**: Routing and handlers (web feature)

## REST API Endpoints

- `POST /register`, `POST /login`, `POST /logout`, `POST /account/delete`
- `POST /upload` - multipart upload of a data file
- `GET /files` - the caller's files
- `POST /select_file` - choose the active file
- `GET /session_info` - active file and username
- `POST /analyze` - dataset overview
- `POST /chat` - run a chat message
- `GET /download?format=csv|xlsx` - export the active dataset
*/

pub mod cache;
pub mod commands;
pub mod config;
pub mod downloader;
pub mod graph;
pub mod loader;
pub mod pager;
pub mod table;

#[cfg(feature = "web")]
pub mod ai;
#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod db;
#[cfg(feature = "web")]
pub mod error;
#[cfg(feature = "web")]
pub mod login;

pub use cache::SessionCache;
pub use commands::{Command, Reply};
pub use config::Config;
pub use table::{DType, DataFrame, Value};

#[cfg(feature = "web")]
pub use app::{build_router, AppState};
#[cfg(feature = "web")]
pub use error::AppError;
