use console::Style;
use scubes_core::cube::AssemblyOutcome;
use scubes_core::pipeline::{ObjectReport, PipelineConfig};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    failed: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            failed: Style::new().red().bold(),
        }
    }
}

pub fn print_run_summary(config: &PipelineConfig, rebuild: bool) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("S-PLUS Cubes"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(12)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Work dir"),
        s.path.apply_to(config.paths.work_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Tiles"),
        s.path.apply_to(config.paths.tiles_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Extractor"),
        s.method.apply_to(config.extraction.backend)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Bands"),
        s.value.apply_to(
            config
                .bands
                .iter()
                .map(|b| b.code())
                .collect::<Vec<_>>()
                .join(" ")
        )
    );
    println!();

    println!("  {}", s.header.apply_to("Cube"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Scale"),
        s.value.apply_to(config.cube.flux_scale)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Errors"),
        s.method.apply_to(config.cube.uncertainty)
    );
    if config.cube.include_mask {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Mask"),
            s.value.apply_to(format!("CLASS_STAR > {}", config.mask.class_star))
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Mask"),
            s.disabled.apply_to("disabled")
        );
    }
    if rebuild {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Rebuild"),
            s.value.apply_to("yes")
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Objects"));
    for (i, o) in config.objects.iter().enumerate() {
        println!(
            "    {}. {} {}",
            s.label.apply_to(i + 1),
            s.value.apply_to(&o.name),
            s.label.apply_to(format!("{} {}x{}", o.tile, o.size, o.size))
        );
    }
    println!();
}

pub fn print_object_reports(reports: &[ObjectReport]) {
    let s = Styles::new();

    println!();
    for r in reports {
        match &r.result {
            Ok(AssemblyOutcome::Written {
                path,
                bands,
                has_errors,
                has_mask,
            }) => {
                let mut layers = vec!["DATA"];
                if *has_errors {
                    layers.push("ERRORS");
                }
                if *has_mask {
                    layers.push("MASK");
                }
                println!(
                    "  {:<16}{} {}",
                    s.value.apply_to(&r.name),
                    s.path.apply_to(path.display()),
                    s.label.apply_to(format!("{} bands, {}", bands.len(), layers.join("+")))
                );
            }
            Ok(AssemblyOutcome::Skipped(path)) => println!(
                "  {:<16}{} {}",
                s.value.apply_to(&r.name),
                s.disabled.apply_to("exists"),
                s.path.apply_to(path.display())
            ),
            Ok(AssemblyOutcome::Aborted) => println!(
                "  {:<16}{}",
                s.value.apply_to(&r.name),
                s.disabled.apply_to("quit during mask refinement")
            ),
            Err(e) => println!(
                "  {:<16}{} {}",
                s.value.apply_to(&r.name),
                s.failed.apply_to("failed"),
                e
            ),
        }
    }
    println!();
}
