use crate::codec::TrackSummary;

fn format_duration(seconds: f64) -> String {
    let rounded = seconds.round().max(0.0) as u64;
    let hours = rounded / 3600;
    let minutes = (rounded % 3600) / 60;
    let seconds = rounded % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else {
        format!("{}m {:02}s", minutes, seconds)
    }
}

fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.2} km", meters / 1000.0)
    } else {
        format!("{:.0} m", meters)
    }
}

/// One-line, ASCII-only description of a converted activity.
pub fn render_summary_line(summary: &TrackSummary) -> String {
    let mut parts = vec![
        summary.sport.as_str().to_string(),
        format_distance(summary.total_distance_m),
        format_duration(summary.total_elapsed_seconds),
        format!("{} points", summary.point_count),
    ];
    if summary.total_ascent_m > 0.0 {
        parts.push(format!("{:.0} m ascent", summary.total_ascent_m));
    }
    if let Some(hr) = summary.avg_heart_rate {
        parts.push(format!("avg HR {hr} bpm"));
    }
    parts.join(", ")
}

pub fn render_landing_page() -> String {
    r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>TrackFit</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 0; padding: 0; background: #f7f7f7; }
    header { background: #20232a; color: white; padding: 1rem 2rem; }
    main { padding: 2rem; max-width: 960px; margin: 0 auto; }
    .drop-zone { border: 2px dashed #888; padding: 2rem; background: white; text-align: center; }
    .drop-zone.drag { border-color: #2563eb; background: #eff6ff; }
    .status { margin-top: 1rem; }
    button { background: #2563eb; color: white; border: none; padding: 0.75rem 1.5rem; border-radius: 4px; cursor: pointer; }
    button:hover { background: #1d4ed8; }
  </style>
</head>
<body>
  <header><h1>TrackFit</h1></header>
  <main>
    <p>Upload a GPX track to convert it into a FIT activity file.</p>
    <div id="drop-zone" class="drop-zone">
      <p>Drag & drop your GPX file here, or click to select.</p>
      <input id="file-input" type="file" accept=".gpx" style="display:none" />
      <button id="select-btn" type="button">Choose a file</button>
    </div>
    <p class="status" id="status"></p>
    <p><a id="download" style="display:none">Download FIT file</a></p>
  </main>
  <script>
    const dropZone = document.getElementById('drop-zone');
    const fileInput = document.getElementById('file-input');
    const selectBtn = document.getElementById('select-btn');
    const statusEl = document.getElementById('status');
    const downloadEl = document.getElementById('download');

    const preventDefaults = (e) => { e.preventDefault(); e.stopPropagation(); };
    ['dragenter', 'dragover', 'dragleave', 'drop'].forEach(eventName => {
      dropZone.addEventListener(eventName, preventDefaults, false);
      document.body.addEventListener(eventName, preventDefaults, false);
    });
    ['dragenter', 'dragover'].forEach(eventName => {
      dropZone.addEventListener(eventName, () => dropZone.classList.add('drag'), false);
    });
    ['dragleave', 'drop'].forEach(eventName => {
      dropZone.addEventListener(eventName, () => dropZone.classList.remove('drag'), false);
    });

    dropZone.addEventListener('click', () => fileInput.click());
    selectBtn.addEventListener('click', (e) => { e.stopPropagation(); fileInput.click(); });
    dropZone.addEventListener('drop', handleFiles);
    fileInput.addEventListener('change', (e) => handleFiles({ dataTransfer: { files: e.target.files } }));

    async function handleFiles(e) {
      const files = e.dataTransfer.files;
      if (!files || files.length === 0) {
        return;
      }
      const formData = new FormData();
      formData.append('file', files[0]);
      statusEl.textContent = 'Converting...';
      downloadEl.style.display = 'none';
      try {
        const response = await fetch('/convert', { method: 'POST', body: formData });
        if (!response.ok) {
          statusEl.textContent = 'Conversion failed: ' + await response.text();
          return;
        }
        const blob = await response.blob();
        const disposition = response.headers.get('content-disposition') || '';
        const match = disposition.match(/filename="([^"]+)"/);
        downloadEl.href = URL.createObjectURL(blob);
        downloadEl.download = match ? match[1] : 'activity.fit';
        downloadEl.style.display = 'inline';
        statusEl.textContent = response.headers.get('x-activity-summary') || 'Converted.';
      } catch (err) {
        statusEl.textContent = 'Conversion failed: ' + err;
      }
    }
  </script>
</body>
</html>"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Sport;

    fn summary() -> TrackSummary {
        TrackSummary {
            start_time: None,
            total_elapsed_seconds: 3725.4,
            total_distance_m: 12_340.0,
            total_ascent_m: 88.6,
            avg_heart_rate: Some(151),
            max_heart_rate: Some(178),
            avg_cadence: None,
            max_cadence: None,
            avg_speed_mps: Some(3.3),
            max_speed_mps: Some(5.0),
            min_altitude_m: None,
            max_altitude_m: None,
            point_count: 3726,
            sport: Sport::Running,
        }
    }

    #[test]
    fn summary_line_lists_key_metrics() {
        assert_eq!(
            render_summary_line(&summary()),
            "running, 12.34 km, 1h 02m 05s, 3726 points, 89 m ascent, avg HR 151 bpm"
        );
    }

    #[test]
    fn short_activities_use_meters_and_minutes() {
        let mut short = summary();
        short.total_distance_m = 22.24;
        short.total_elapsed_seconds = 10.0;
        short.total_ascent_m = 0.0;
        short.avg_heart_rate = None;
        assert_eq!(render_summary_line(&short), "running, 22 m, 0m 10s, 3726 points");
    }

    #[test]
    fn landing_page_posts_to_convert() {
        let page = render_landing_page();
        assert!(page.contains("fetch('/convert'"));
        assert!(page.contains("accept=\".gpx\""));
    }
}
