#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::assert_batches_eq;
use datafusion::prelude::SessionContext;
use sail_lua_common::config::AppConfig;
use sail_lua_fdw::LuaTableProvider;

const USERS_SCRIPT: &str = r#"
local rows = {
    { id = "1", name = "Alice", active = "t", born = "1990-01-02" },
    { id = "2", name = "Bob", active = "f" },
    { id = "30", name = "Carol", active = "yes", born = "1985-12-31" },
}
local i = 0
function EstimateRowCount() return #rows end
function ScanStart() i = 0 end
function ScanRestart() i = 0 end
function ScanIterate(ctx)
    i = i + 1
    return rows[i]
end
function ScanExplain(ctx) return "Lua scan of " .. ctx.table end
"#;

fn users_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("active", DataType::Boolean, true),
        Field::new("born", DataType::Date32, true),
    ])
}

fn register(ctx: &SessionContext, name: &str, schema: &Schema, options: &[(&str, &str)]) {
    let options = options
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<HashMap<_, _>>();
    let config = AppConfig::defaults().unwrap();
    let provider = LuaTableProvider::try_new(name, schema, &options, &config).unwrap();
    ctx.register_table(name, Arc::new(provider)).unwrap();
}

#[tokio::test]
async fn test_select_all_rows() {
    let ctx = SessionContext::new();
    register(&ctx, "users", &users_schema(), &[("inject", USERS_SCRIPT)]);
    let batches = ctx
        .sql("SELECT id, name, active, born FROM users ORDER BY id")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_batches_eq!(
        [
            "+----+-------+--------+------------+",
            "| id | name  | active | born       |",
            "+----+-------+--------+------------+",
            "| 1  | Alice | true   | 1990-01-02 |",
            "| 2  | Bob   | false  |            |",
            "| 30 | Carol | true   | 1985-12-31 |",
            "+----+-------+--------+------------+",
        ],
        &batches
    );
}

#[tokio::test]
async fn test_filters_are_applied_after_scan() {
    let ctx = SessionContext::new();
    register(&ctx, "users", &users_schema(), &[("inject", USERS_SCRIPT)]);
    let batches = ctx
        .sql("SELECT name FROM users WHERE id > 1 AND name LIKE 'C%'")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_batches_eq!(
        ["+-------+", "| name  |", "+-------+", "| Carol |", "+-------+"],
        &batches
    );
}

#[tokio::test]
async fn test_pushed_down_conditions_reach_script() {
    let script = r#"
        local done = false
        function ScanStart() done = false end
        function ScanIterate(ctx)
            if done then return nil end
            done = true
            local parts = {}
            for _, c in ipairs(ctx.clauses) do
                parts[#parts + 1] = c.column .. " " .. c.operator .. " " .. c.type .. " " .. c.constant
            end
            table.sort(parts)
            return { id = "30", name = table.concat(parts, "; ") }
        end
    "#;
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]);
    let ctx = SessionContext::new();
    register(&ctx, "filtered", &schema, &[("inject", script)]);
    let batches = ctx
        .sql("SELECT name FROM filtered WHERE id = 30 AND name LIKE 'i_%'")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_batches_eq!(
        [
            "+--------------------------------------+",
            "| name                                 |",
            "+--------------------------------------+",
            "| id eq integer 30; name like text i_% |",
            "+--------------------------------------+",
        ],
        &batches
    );
}

#[tokio::test]
async fn test_limit() {
    let ctx = SessionContext::new();
    register(&ctx, "users", &users_schema(), &[("inject", USERS_SCRIPT)]);
    let batches = ctx
        .sql("SELECT id FROM users LIMIT 2")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let rows = batches.iter().map(|b| b.num_rows()).sum::<usize>();
    assert_eq!(rows, 2);
}

#[tokio::test]
async fn test_explain_shows_script_annotation() {
    let ctx = SessionContext::new();
    register(&ctx, "users", &users_schema(), &[("inject", USERS_SCRIPT)]);
    let batches = ctx
        .sql("EXPLAIN SELECT id FROM users")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let text = pretty_format_batches(&batches).unwrap().to_string();
    assert!(text.contains("LuaScanExec: table=users, rows=3"), "{text}");
    assert!(text.contains("script=Lua scan of users"), "{text}");
}

#[tokio::test]
async fn test_script_error_fails_query() {
    let script = r#"function ScanIterate() error("backend unavailable") end"#;
    let ctx = SessionContext::new();
    register(&ctx, "broken", &users_schema(), &[("inject", script)]);
    let err = ctx
        .sql("SELECT * FROM broken")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("backend unavailable"), "{err}");
}

#[tokio::test]
async fn test_script_log_request_fails_query() {
    let script = r#"function ScanStart() fdw.ereport(fdw.ERROR, "quota exceeded") end"#;
    let ctx = SessionContext::new();
    register(&ctx, "limited", &users_schema(), &[("inject", script)]);
    let err = ctx
        .sql("SELECT * FROM limited")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("ERROR: quota exceeded"), "{err}");
}

#[tokio::test]
async fn test_insert_through_script() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("inserted.csv");
    let script_path = dir.path().join("sink.lua");
    std::fs::write(
        &script_path,
        r#"
        local out
        function BeginForeignModify(ctx) out = assert(io.open(OUTPUT, "w")) end
        function ExecForeignInsert(ctx, row)
            out:write(ctx.table, ",", row.id, ",", row.name or "NULL", "\n")
            return row.name ~= nil
        end
        function EndForeignModify(ctx) out:close() end
        "#,
    )
    .unwrap();
    let inject = format!("OUTPUT = {:?}", output.to_string_lossy());
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]);
    let ctx = SessionContext::new();
    register(
        &ctx,
        "sink",
        &schema,
        &[
            ("script", script_path.to_string_lossy().as_ref()),
            ("inject", inject.as_str()),
        ],
    );
    let batches = ctx
        .sql("INSERT INTO sink VALUES (1, 'Alice'), (2, NULL)")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_batches_eq!(
        ["+-------+", "| count |", "+-------+", "| 2     |", "+-------+"],
        &batches
    );
    let content = std::fs::read_to_string(&output).unwrap();
    assert_eq!(content, "sink,1,Alice\nsink,2,NULL\n");
}

#[tokio::test]
async fn test_failed_insert_input_skips_end_hook() {
    let dir = tempfile::tempdir().unwrap();
    let sink = format!(
        r#"
        DIR = {:?}
        local function touch(name) assert(io.open(DIR .. "/" .. name, "w")):close() end
        function BeginForeignModify(ctx) touch("began") end
        function ExecForeignInsert(ctx, row) end
        function EndForeignModify(ctx) touch("ended") end
        "#,
        dir.path().to_string_lossy()
    );
    let source = r#"
        local calls = 0
        function ScanIterate(ctx)
            calls = calls + 1
            if calls == 1 then return { id = "1", name = "Alice" } end
            fdw.ereport(fdw.ERROR, "source went away")
        end
    "#;
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]);
    let ctx = SessionContext::new();
    register(&ctx, "sink", &schema, &[("inject", sink.as_str())]);
    register(&ctx, "source", &schema, &[("inject", source)]);
    let err = ctx
        .sql("INSERT INTO sink SELECT id, name FROM source")
        .await
        .unwrap()
        .collect()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("source went away"), "{err}");
    assert!(dir.path().join("began").exists());
    assert!(!dir.path().join("ended").exists());
}
