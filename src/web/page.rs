//! Viewer page served at `/`

/// Full-window viewer embedding the live stream
pub const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Camera</title>
  <meta name="viewport" content="width=device-width,initial-scale=1">
  <style>
    html,body{margin:0;padding:0;background:#111;color:#eee;font-family:system-ui,Segoe UI,Roboto,Arial}
    .wrap{display:grid;place-items:center;height:100vh;gap:1rem}
    img{max-width:95vw;max-height:85vh;border-radius:12px;box-shadow:0 0 0 1px #222}
    .bar{opacity:.8}
    code{background:#222;padding:.2em .4em;border-radius:6px}
  </style>
</head>
<body>
  <div class="wrap">
    <div class="bar">Live stream at <code>/stream.mjpg</code> &middot; still image at <code>/snapshot.jpg</code></div>
    <img src="/stream.mjpg" alt="Live camera stream" />
    <div class="bar">Choppy on a Pi 3? Lower <code>capture.width</code>, <code>capture.height</code> or <code>capture.fps</code>.</div>
  </div>
</body>
</html>
"#;
