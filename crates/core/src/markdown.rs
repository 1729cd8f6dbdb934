use crate::model::DuplicateReport;

pub fn render_markdown_summary(report: &DuplicateReport) -> String {
    let mut out = String::new();
    out.push_str("# Duplicate Summary\n\n");
    out.push_str(&format!(
        "- Report version: `{}`\n- Generated at: `{}`\n- Scan root: `{}`\n- Scan elapsed: `{} ms`\n\n",
        report.report_version,
        report.generated_at,
        report.summary.root.display(),
        report.summary.elapsed_ms
    ));

    let stats = &report.statistics;
    out.push_str("## Statistics\n\n");
    out.push_str(&format!(
        "- Files seen: {}\n- Files hashed: {} ({} skipped by size, {} failed)\n- Unique files: {}\n- Duplicate files: {} in {} group(s)\n- Reclaimable space: {}\n\n",
        report.summary.files_seen,
        report.summary.files_hashed,
        report.summary.size_unique_files,
        report.summary.hash_failures,
        stats.unique_files,
        stats.duplicate_files,
        stats.duplicate_groups,
        human_bytes(stats.wasted_space)
    ));

    out.push_str("## Exact Duplicates\n\n");
    if report.groups.is_empty() {
        out.push_str("No duplicate files found.\n\n");
    } else {
        for group in &report.groups {
            let short_hash = group.hash.get(..12).unwrap_or(&group.hash);
            out.push_str(&format!(
                "### `{}` ({} copies of {}, {} reclaimable)\n\n",
                short_hash,
                group.count,
                human_bytes(group.size),
                human_bytes(group.wasted_space)
            ));
            if let Some(keep) = group.keep() {
                out.push_str(&format!("- keep `{}`\n", keep.path.display()));
            }
            for file in group.redundant() {
                out.push_str(&format!("- redundant `{}`\n", file.path.display()));
            }
            out.push('\n');
        }
    }

    if !report.image_clusters.is_empty() {
        out.push_str("## Similar Images\n\n");
        for (index, cluster) in report.image_clusters.iter().enumerate() {
            out.push_str(&format!(
                "- Cluster {} (max distance {}): {}\n",
                index + 1,
                cluster.max_distance,
                backticked(cluster.paths.iter().map(|path| path.display().to_string()))
            ));
        }
        out.push('\n');
    }

    if !report.document_clusters.is_empty() {
        out.push_str("## Similar Documents\n\n");
        for (index, cluster) in report.document_clusters.iter().enumerate() {
            out.push_str(&format!(
                "- Cluster {} (similarity {:.2}, ~{} reclaimable): {}\n",
                index + 1,
                cluster.average_similarity,
                human_bytes(cluster.estimated_wasted_space),
                backticked(cluster.paths.iter().map(|path| path.display().to_string()))
            ));
        }
        out.push('\n');
    }

    if !report.summary.warnings.is_empty() {
        out.push_str("## Warnings\n\n");
        for warning in &report.summary.warnings {
            out.push_str(&format!("- {}\n", warning));
        }
    }

    out
}

fn backticked(items: impl Iterator<Item = String>) -> String {
    items
        .map(|item| format!("`{item}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn human_bytes(value: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if value == 0 {
        return "0 B".to_string();
    }
    let mut size = value as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}
