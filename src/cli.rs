//! Ligne de commande `netlens`

use crate::api;
use crate::decode::{self, CaptureFormat};
use crate::services::query::{PacketPage, PacketQuery};
use crate::services::NetlensService;
use crate::stats::report::SummaryReport;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use num_format::{Locale, ToFormattedString};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "netlens")]
#[command(about = "Agrégation et enrichissement de captures réseau décodées", version)]
pub struct Cli {
    /// Fichier de configuration (défaut: /etc/netlens/config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingère une capture (JSON de paquets décodés ou pcap)
    Ingest {
        file: PathBuf,
        /// Format du fichier, déduit de l'extension par défaut
        #[arg(long, value_enum)]
        format: Option<CaptureFormat>,
        /// Nom de l'ingestion (défaut: nom du fichier)
        #[arg(long)]
        name: Option<String>,
    },
    /// Affiche le résumé d'une ingestion
    Summary {
        #[arg(long)]
        run: Option<String>,
    },
    /// Liste les paquets, filtrés et paginés
    Packets {
        #[arg(long)]
        run: Option<String>,
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long)]
        per_page: Option<i64>,
        #[arg(long)]
        protocol: Option<String>,
        #[arg(long)]
        ip: Option<String>,
    },
    /// Annuaire IP-MAC enrichi
    Hosts {
        #[arg(long)]
        run: Option<String>,
    },
    /// Liste les ingestions stockées
    Runs {
        #[arg(long, default_value = "0")]
        skip: usize,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Démarre l'API HTTP
    Serve,
}

fn fmt_count(value: u64) -> String {
    value.to_formatted_string(&Locale::fr)
}

fn print_summary(report: &SummaryReport) {
    let overview = &report.overview;
    println!("\n=== RÉSUMÉ ===");
    println!("Paquets: {}", fmt_count(overview.total_packets));
    println!("Octets: {}", fmt_count(overview.total_bytes));
    println!("IP uniques: {}", overview.unique_ips);
    println!("MAC uniques: {}", overview.unique_macs);
    println!("Durée: {:.2} s", overview.duration_sec);

    println!("\nProtocoles:");
    for share in &report.protocol_distribution {
        println!("  {:<12} {:>10} ({:.1}%)", share.protocol, fmt_count(share.count), share.pct);
    }

    println!("\nTailles de paquets:");
    for bucket in &report.size_histogram {
        println!(
            "  {:<10} n={:<8} min={:<5} max={:<5} moy={:<8.1} méd={:<8.1} p95={:.1}",
            bucket.range, bucket.count, bucket.min, bucket.max, bucket.mean, bucket.median, bucket.p95
        );
    }
    println!("\nSecondes avec trafic: {}", report.pps.len());
}

fn print_packets(page: &PacketPage) {
    println!(
        "Page {} ({} par page), {} paquets correspondants",
        page.page,
        page.per_page,
        fmt_count(page.total as u64)
    );
    for row in &page.items {
        println!(
            "{:<10} {} {:>15} -> {:<15} {:<10} {:>6}  {}",
            row.id, row.ts, row.src, row.dst, row.proto, row.size, row.info
        );
    }
}

/// Exécute la commande demandée
pub async fn run(command: Command, service: Arc<NetlensService>) -> Result<()> {
    match command {
        Command::Ingest { file, format, name } => {
            let format = format.unwrap_or_else(|| CaptureFormat::from_path(&file));
            let path = file.clone();
            let packets = tokio::task::spawn_blocking(move || decode::load(&path, format))
                .await
                .context("tâche de décodage interrompue")?
                .with_context(|| format!("lecture de {}", file.display()))?;

            let name = name.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "capture".to_string())
            });
            let info = service.ingest(&name, packets).await?;
            println!(
                "Ingestion {} créée: {} paquets, {} octets, {} diagnostics",
                info.id,
                fmt_count(info.packet_count),
                fmt_count(info.total_bytes),
                info.diagnostics
            );
        }
        Command::Summary { run } => {
            let report = service.summary(run.as_deref()).await?;
            print_summary(&report);
        }
        Command::Packets {
            run,
            page,
            per_page,
            protocol,
            ip,
        } => {
            let query = PacketQuery {
                page: Some(page),
                per_page,
                protocol,
                ip,
                file_id: run,
            };
            let page = service.packets(&query).await?;
            print_packets(&page);
        }
        Command::Hosts { run } => {
            let hosts = service.ip_mac_map(run.as_deref()).await?;
            for host in &hosts {
                println!(
                    "{:<40} {:<18} {:<25} {:>8} {:>12}  {}  {}",
                    host.ip,
                    host.mac.as_deref().unwrap_or("-"),
                    host.host,
                    fmt_count(host.packets),
                    fmt_count(host.bytes),
                    host.vendor.as_deref().unwrap_or("-"),
                    host.user_name.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Runs { skip, limit } => {
            for run in service.list_runs(skip, limit).await? {
                println!(
                    "{:<28} {} {:<30} {:>10} paquets",
                    run.id,
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                    run.name,
                    fmt_count(run.packet_count)
                );
            }
        }
        Command::Serve => {
            let addr = service.config().listen_addr();
            api::serve(service, &addr)
                .await
                .with_context(|| format!("serveur HTTP sur {}", addr))?;
        }
    }
    Ok(())
}
