
mod logging;

use std::io::{Cursor, Read, Seek};
use std::path::Path;

use libmpo::{
    IfdEvent, IfdParser, IfdType, MpImageType, MpfIndex, MpoData, MpoImage, TiffStream, jpeg, split_mpo_bytes,
    split_mpo_file, tags, write_mpo_file,
};

use log::{error, info, warn};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Print debug output.
    #[arg(short='v', long="verbose", global=true)]
    verbose: bool,
    /// Also write the log to this file.
    #[arg(long="log-file", global=true)]
    log_file_path: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cut an MPO file into its JPEG pictures.
    Split {
        input_file_path: String,
        /// The directory to write the pictures to.
        #[arg(short='o', long="output-dir", default_value=".")]
        output_dir: String,
        /// Split while reading instead of loading the whole file first.
        /// Expects every picture to carry an Exif thumbnail.
        #[arg(long)]
        stream: bool,
    },
    /// Print the Exif and MPF tags of a JPEG or MPO file.
    Dump {
        input_file_path: String,
    },
    /// Pack JPEG files into an MPO file. The first one is the primary image.
    Pack {
        /// The output file to write.
        #[arg(short='o', long="output")]
        output_file_path: String,
        primary_file_path: String,
        auxiliary_file_paths: Vec<String>,
        /// MP type of the auxiliary images.
        #[arg(long="type", value_enum, default_value_t=AuxiliaryType::Disparity)]
        auxiliary_type: AuxiliaryType,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AuxiliaryType {
    Disparity,
    Panorama,
    MultiAngle,
}

impl From<AuxiliaryType> for MpImageType {
    fn from(value: AuxiliaryType) -> Self {
        match value {
            AuxiliaryType::Disparity => MpImageType::MultiFrameDisparity,
            AuxiliaryType::Panorama => MpImageType::MultiFramePanorama,
            AuxiliaryType::MultiAngle => MpImageType::MultiFrameMultiAngle,
        }
    }
}

fn read_input(path: &str) -> Vec<u8> {
    let Ok(content) = std::fs::read(path) else {
        error!("Error reading input file: {}", path);
        std::process::exit(1);
    };
    content
}

fn split(input_file_path: &str, output_dir: &str, stream: bool) {
    let images = if stream {
        let split = split_mpo_file(input_file_path);
        if let Some(fault) = &split.fault {
            error!("Error reading {}, keeping {} complete pictures: {}", input_file_path, split.images.len(), fault);
        }
        split.into_images()
    } else {
        split_mpo_bytes(&read_input(input_file_path))
    };

    if images.is_empty() {
        warn!("No pictures found in {}", input_file_path);
    }

    let stem = Path::new(input_file_path)
        .file_stem()
        .map_or_else(|| "image".to_string(), |stem| stem.to_string_lossy().into_owned());
    for (i, image) in images.iter().enumerate() {
        let output_file_path = Path::new(output_dir).join(format!("{}_{}.jpg", stem, i));
        if let Err(e) = std::fs::write(&output_file_path, image) {
            error!("Error writing output file {}: {}", output_file_path.display(), e);
            std::process::exit(1);
        }
        info!("Wrote {} ({} bytes)", output_file_path.display(), image.len());
    }
}

fn dump_directory<R: Read + Seek>(parser: &mut IfdParser<'_, R>) -> libmpo::Result<()> {
    loop {
        match parser.next()? {
            IfdEvent::NewTag => {
                let tag = parser.read_tag()?;
                if tag.has_offset_slot() || tags::sub_ifd_type(tag.ifd, tag.id).is_some() {
                    let offset = parser.read_unsigned_int()?;
                    parser.wait_value_of_tag(tag, offset);
                } else {
                    print_value(parser, tag)?;
                }
            }
            IfdEvent::ValueOfPrevTag => {
                let Some(tag) = parser.corresponding_tag() else {
                    continue;
                };
                if tags::sub_ifd_type(tag.ifd, tag.id).is_some() {
                    dump_directory(&mut parser.parse_ifd_block()?)?;
                } else {
                    print_value(parser, tag)?;
                }
            }
            IfdEvent::NextIfd => {
                dump_directory(&mut parser.parse_ifd_block()?)?;
            }
            IfdEvent::End => return Ok(()),
        }
    }
}

fn print_value<R: Read + Seek>(parser: &mut IfdParser<'_, R>, tag: libmpo::Tag) -> libmpo::Result<()> {
    let name = tags::lookup(tag.ifd, tag.id).map_or("Unknown", |info| info.name);
    let value = parser.read_value(&tag)?;
    let mut text = value.to_string();
    if text.chars().count() > 96 {
        text = text.chars().take(96).chain("...".chars()).collect();
    }
    println!("{:?} 0x{:04X} {} = {}", tag.ifd, tag.id, name, text);
    Ok(())
}

fn dump_tiff<'a>(
    open: fn(Cursor<&'a [u8]>) -> libmpo::Result<TiffStream<Cursor<&'a [u8]>>>,
    content: &'a [u8],
    ifd_type: IfdType,
) -> libmpo::Result<bool> {
    let mut stream = match open(Cursor::new(content)) {
        Ok(stream) => stream,
        Err(libmpo::Error::MissingSegment(_)) => return Ok(false),
        Err(e) => return Err(e),
    };
    let mut parser = stream.parse(ifd_type)?;
    dump_directory(&mut parser)?;
    Ok(true)
}

fn dump(input_file_path: &str) -> libmpo::Result<()> {
    let content = read_input(input_file_path);

    if !dump_tiff(TiffStream::from_jpeg, &content, IfdType::Ifd0)? {
        info!("No Exif segment in {}", input_file_path);
    }
    if !dump_tiff(TiffStream::from_mpf_jpeg, &content, IfdType::MpIndex)? {
        info!("No MPF segment in {}", input_file_path);
        return Ok(());
    }

    if let Some(segment) = jpeg::find_segment(&content, jpeg::APP2, jpeg::MPF_IDENTIFIER)? {
        let index = MpfIndex::from_tiff_bytes(&segment.payload(&content)[jpeg::MPF_IDENTIFIER.len()..])?;
        for (i, entry) in index.entries.iter().enumerate() {
            println!(
                "Image {}: {:?}{}, {} bytes at offset {}",
                i + 1,
                entry.image_type(),
                if entry.is_representative() { " (representative)" } else { "" },
                entry.size,
                entry.offset
            );
        }
    }
    Ok(())
}

fn pack(output_file_path: &str, primary_file_path: &str, auxiliary_file_paths: &[String], auxiliary_type: AuxiliaryType) -> libmpo::Result<()> {
    let primary = MpoImage::new(read_input(primary_file_path), MpImageType::BaselinePrimary);
    let mut mpo = MpoData::new(primary);
    for path in auxiliary_file_paths {
        mpo.add_auxiliary(MpoImage::new(read_input(path), auxiliary_type.into()));
    }

    let written = write_mpo_file(&mpo, output_file_path)?;
    info!("Wrote {} images to {} ({} bytes)", mpo.num_images(), output_file_path, written);
    Ok(())
}

fn main() {
    let args = Args::parse();

    let mut logging_config = logging::LoggingConfig::default();
    if args.verbose {
        logging_config = logging_config.verbose();
    }
    if let Some(log_file_path) = &args.log_file_path {
        logging_config = logging_config.output_to_file(log_file_path);
    }
    if let Err(e) = logging_config.apply() {
        eprintln!("Error setting up logging: {}", e);
        std::process::exit(1);
    }

    let result = match &args.command {
        Command::Split { input_file_path, output_dir, stream } => {
            split(input_file_path, output_dir, *stream);
            Ok(())
        }
        Command::Dump { input_file_path } => dump(input_file_path),
        Command::Pack { output_file_path, primary_file_path, auxiliary_file_paths, auxiliary_type } => {
            pack(output_file_path, primary_file_path, auxiliary_file_paths, *auxiliary_type)
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
