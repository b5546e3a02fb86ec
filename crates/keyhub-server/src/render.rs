//! HTML views: login page, server index and per-server dashboard.
//!
//! Rendering is a pure projection of snapshots; nothing here touches state.

use minijinja::{context, Environment};
use serde::Serialize;

use crate::error::Result;
use crate::store::{ServerSummary, Snapshot};

const LOGIN: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>KeyHub</title>
  <style>
    body { font-family: sans-serif; background: #4a374a; margin: 0; }
    #login { width: 300px; margin: 15vh auto; }
    h1 { color: #fff; text-align: center; }
    input, button { width: 100%; box-sizing: border-box; padding: 10px; margin-bottom: 10px; border-radius: 4px; }
    button { background: #4a77d4; color: #fff; border: 1px solid #3762bc; }
    #error { color: #fbb; text-align: center; min-height: 1em; }
  </style>
</head>
<body data-home="{{ home }}">
  <div id="login">
    <h1>KeyHub</h1>
    <input type="text" id="username" placeholder="Username" autocomplete="username">
    <input type="password" id="password" placeholder="Password" autocomplete="current-password"
           onkeydown="if (event.key === 'Enter') { login(); }">
    <button type="button" onclick="login();">Login</button>
    <div id="error"></div>
  </div>
  <script>
    async function login() {
      const q = new URLSearchParams({
        user: document.getElementById("username").value,
        pass: document.getElementById("password").value,
      });
      const resp = await fetch("/login?" + q, { method: "POST", credentials: "same-origin" });
      if (resp.status === 200) {
        location.replace(document.body.dataset.home);
      } else {
        document.getElementById("error").innerText = "login failed";
      }
    }
  </script>
</body>
</html>
"#;

const INDEX: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>KeyHub</title>
  <style>
    table { font-family: arial, sans-serif; border-collapse: collapse; width: 100%; }
    td, th { border: 1px solid #ddd; text-align: left; padding: 8px; }
  </style>
</head>
<body>
  <h2>KeyHub - {{ servers|length }} server(s)</h2>
  <table>
    <tr><th>ID</th><th>Name</th><th>Accounts</th><th>Transferred</th><th>Created</th></tr>
    {% for server in servers %}
    <tr>
      <td><a href="{{ base }}/{{ server.id }}">{{ server.id }}</a></td>
      <td>{{ server.name }}</td>
      <td>{{ server.account_count }}</td>
      <td>{{ server.total }}</td>
      <td>{{ server.created }}</td>
    </tr>
    {% endfor %}
  </table>
</body>
</html>
"#;

const DASHBOARD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>KeyHub - {{ server.name }}</title>
  <style>
    table { font-family: arial, sans-serif; border-collapse: collapse; width: 100%; }
    td, th { border: 1px solid #ddd; text-align: left; padding: 8px; }
    tr:nth-child(odd) { background-color: #ddd; }
    .on { background-color: green; }
    .off { background-color: red; }
    .warn { background-color: orange; }
  </style>
</head>
<body data-base="{{ base }}" data-prefix="{{ prefix }}">
<h2>
  <a href="{{ base }}">KeyHub</a> / {{ server.name }} (#{{ server.id }}) - {{ server.total }}
  <button type="button" onclick="call('POST', '/user');">ADD USER</button>
  <button type="button" id="refresh" onclick="toggleRefresh();">REFRESH ON</button>
  <button type="button" onclick="logout();">EXIT</button>
</h2>
<p>
  Server id {{ server.server_id }}, created {{ server.created }},
  metrics {{ "enabled" if server.metrics_enabled else "disabled" }},
  new keys on port {{ server.port_for_new_access_keys }}, {{ server.account_count }} account(s).
</p>
{% if server.inconsistent %}
<p class="warn">Backends disagree on the data limit of: {{ server.inconsistent|join(", ") }}. Set the allowance again to repair.</p>
{% endif %}

<table>
  <tr>
    <th>ID</th><th>Name</th><th>Expire Date</th><th>Access URL</th><th>Transferred</th>
    <th>Data Limit</th><th>Client IP</th><th>Online</th><th>Enabled</th><th>Days Left</th><th></th>
  </tr>
  {% for account in accounts %}
  <tr data-id="{{ account.id }}"{% if account.id in server.inconsistent %} class="warn"{% endif %}>
    <td>{{ account.id }}</td>
    <td><input class="name" value="{{ account.name }}" size="8" onkeydown="onEnter(event, this, '/name', 'name');"></td>
    <td>{{ account.expires }}</td>
    <td>
      <input class="url" type="text" value="{{ account.access_url }}" size="50" readonly>
      <button type="button" onclick="copyUrl(this);">COPY</button>
    </td>
    <td>{{ account.transferred }}</td>
    <td><input value="{{ account.limit }}" size="4" onkeydown="onEnter(event, this, '/data', 'allowance');">GB</td>
    <td>{% if account.ip %}{{ account.ip }}{% endif %}</td>
    <td class="{{ 'on' if account.online else 'off' }}">{{ account.online }}</td>
    <td class="{{ 'on' if account.enabled else 'off' }}">
      {{ account.enabled }}
      <button type="button" onclick="call('PATCH', '/status', { id: rowId(this) });">SWITCH</button>
    </td>
    <td><input value="{{ account.days_left }}" size="3" onkeydown="onEnter(event, this, '/deadline', 'days');"></td>
    <td><button type="button" onclick="call('DELETE', '/id', { id: rowId(this) });">DELETE</button></td>
  </tr>
  {% endfor %}
</table>

<p>
  Admin settings: username <input id="admin-user" size="10">
  password <input id="admin-pass" type="password" size="10">
  <button type="button" onclick="setAdmin();">MODIFY</button>
</p>

<script>
  const prefix = document.body.dataset.prefix;
  const base = document.body.dataset.base;
  function rowId(el) { return el.closest("tr").dataset.id; }
  async function call(method, path, params) {
    const q = params ? "?" + new URLSearchParams(params) : "";
    await fetch(prefix + path + q, { method: method, credentials: "same-origin" });
    setTimeout(() => location.reload(), 500);
  }
  function onEnter(event, el, path, key) {
    if (event.key !== "Enter") { return; }
    const params = { id: rowId(el) };
    params[key] = el.value;
    call("PUT", path, params);
  }
  function copyUrl(el) {
    const input = el.parentElement.querySelector(".url");
    navigator.clipboard.writeText(input.value);
  }
  async function setAdmin() {
    const q = new URLSearchParams({
      user: document.getElementById("admin-user").value,
      pass: document.getElementById("admin-pass").value,
    });
    await fetch(base + "/set/admin?" + q, { method: "POST", credentials: "same-origin" });
    setTimeout(() => location.reload(), 500);
  }
  async function logout() {
    await fetch("/logout", { method: "POST", credentials: "same-origin" });
    location.replace("/login");
  }
  function toggleRefresh() {
    const bt = document.getElementById("refresh");
    bt.innerText = bt.innerText === "REFRESH ON" ? "REFRESH OFF" : "REFRESH ON";
  }
  setInterval(() => {
    if (document.getElementById("refresh").innerText === "REFRESH ON") { location.reload(); }
  }, 5000);
</script>
</body>
</html>
"#;

/// Compiled page templates.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("login.html", LOGIN)?;
        env.add_template("index.html", INDEX)?;
        env.add_template("dashboard.html", DASHBOARD)?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: impl Serialize) -> Result<String> {
        Ok(self.env.get_template(name)?.render(ctx)?)
    }

    pub fn login(&self, home: &str) -> Result<String> {
        self.render("login.html", context! { home })
    }

    pub fn index(&self, base: &str, servers: &[ServerSummary]) -> Result<String> {
        self.render("index.html", context! { base, servers })
    }

    /// `prefix` is the route prefix of the server being shown.
    pub fn dashboard(&self, base: &str, prefix: &str, snapshot: &Snapshot) -> Result<String> {
        self.render(
            "dashboard.html",
            context! {
                base,
                prefix,
                server => &snapshot.summary,
                accounts => &snapshot.accounts,
            },
        )
    }
}
